//! HTTP error taxonomy for the webhook endpoint.
//!
//! Every variant is terminal: the pipeline short-circuits to the response
//! and nothing is retried. Failure bodies are
//! `{"code": "<error_kind>", "message": "<text>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Too many requests")]
    RateLimited,

    #[error("Invalid secret key")]
    InvalidSecret,

    #[error("Request origin is not an AWS address")]
    InvalidSourceIp,

    #[error("SNS signature verification failed")]
    InvalidSignature,

    #[error("Invalid JSON payload")]
    InvalidJson,

    #[error("Unknown SNS message type")]
    UnknownType,

    #[error("Missing Message field")]
    MissingMessage,

    #[error("Invalid Message JSON")]
    InvalidMessage,

    #[error("Unrecognized message schema")]
    UnknownMessageKind,

    #[error("Missing SubscribeURL")]
    MissingSubscribeUrl,

    #[error("Subscription confirmation failed: {0}")]
    SubscriptionFailed(String),
}

impl WebhookError {
    /// Stable machine-readable error kind.
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::RateLimited => "rate_limited",
            WebhookError::InvalidSecret => "invalid_secret",
            WebhookError::InvalidSourceIp => "invalid_source_ip",
            WebhookError::InvalidSignature => "invalid_signature",
            WebhookError::InvalidJson => "invalid_json",
            WebhookError::UnknownType => "unknown_type",
            WebhookError::MissingMessage => "missing_message",
            WebhookError::InvalidMessage => "invalid_message",
            WebhookError::UnknownMessageKind => "unknown_message_kind",
            WebhookError::MissingSubscribeUrl => "missing_subscribe_url",
            WebhookError::SubscriptionFailed(_) => "subscription_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            WebhookError::InvalidSecret
            | WebhookError::InvalidSourceIp
            | WebhookError::InvalidSignature => StatusCode::FORBIDDEN,
            WebhookError::InvalidJson
            | WebhookError::UnknownType
            | WebhookError::MissingMessage
            | WebhookError::InvalidMessage
            | WebhookError::UnknownMessageKind
            | WebhookError::MissingSubscribeUrl => StatusCode::BAD_REQUEST,
            WebhookError::SubscriptionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
