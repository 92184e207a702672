//! Webhook endpoint handlers.
//!
//! The SNS handler runs the full ingestion pipeline for one request:
//!
//! ```text
//! rate limit → secret → AWS IP → parse JSON → signature →
//!   classify envelope → parse inner → normalize → persist
//! ```
//!
//! Every verification failure short-circuits to an error response; once
//! verification and classification succeed, persistence failures are logged
//! per row and the caller still sees success - SNS retries the whole
//! webhook otherwise, and a partially stored notification is not worth a
//! retry storm.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::normalize::normalize;
use crate::ratelimit::RateLimiter;
use crate::sns::{self, EnvelopeKind, SnsEnvelope};
use crate::store::EventStore;
use crate::verify::{constant_time_eq, AwsIpValidator, SignatureVerifier};
use crate::web::error::WebhookError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http: reqwest::Client,
    pub rate_limiter: Arc<RateLimiter>,
    pub ip_validator: Arc<AwsIpValidator>,
    pub signature_verifier: Arc<SignatureVerifier>,
    pub store: Arc<dyn EventStore>,
}

impl AppState {
    pub fn new(config: Config, http: reqwest::Client, store: Arc<dyn EventStore>) -> Self {
        let config = Arc::new(config);
        Self {
            rate_limiter: Arc::new(RateLimiter::new()),
            ip_validator: Arc::new(AwsIpValidator::new(
                http.clone(),
                config.aws_ip_ranges_url.clone(),
            )),
            signature_verifier: Arc::new(SignatureVerifier::new(http.clone())),
            config,
            http,
            store,
        }
    }
}

/// Query parameters of the webhook endpoint.
#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    /// Shared secret issued to the SNS subscription.
    pub key: Option<String>,
}

/// Success response body.
#[derive(Serialize)]
pub struct WebhookAck {
    pub message: String,
}

impl WebhookAck {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// SNS Webhook
// =============================================================================

/// SNS webhook endpoint: verify, classify, normalize, persist.
pub async fn sns_webhook(
    State(state): State<AppState>,
    Query(params): Query<WebhookQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, WebhookError> {
    let ip = client_ip(&headers, addr);

    // Throttle before doing any other work.
    if !state.rate_limiter.allow(ip) {
        warn!(ip = %ip, "webhook_rate_limited");
        return Err(WebhookError::RateLimited);
    }

    // The shared secret is always enforced, even when no other check runs.
    let provided = params.key.as_deref().unwrap_or("");
    if !constant_time_eq(&state.config.sns_secret_key, provided) {
        warn!(ip = %ip, "webhook_invalid_secret");
        return Err(WebhookError::InvalidSecret);
    }

    // Origin check. The validator fails open internally, so this only
    // denies on a confirmed non-AWS address.
    if state.config.validate_aws_ip && !state.ip_validator.is_aws_ip(ip).await {
        warn!(ip = %ip, "webhook_non_aws_origin");
        return Err(WebhookError::InvalidSourceIp);
    }

    let payload: Value = match serde_json::from_str(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(ip = %ip, error = %e, "webhook_invalid_json");
            return Err(WebhookError::InvalidJson);
        }
    };

    // Signed SNS payloads must verify. Only payloads lacking both Type and
    // Signature (non-SNS-signed forwards) skip this check.
    if payload.get("Type").is_some() && payload.get("Signature").is_some() {
        let envelope: SnsEnvelope = match serde_json::from_value(payload.clone()) {
            Ok(e) => e,
            Err(e) => {
                warn!(ip = %ip, error = %e, "webhook_malformed_envelope");
                return Err(WebhookError::InvalidJson);
            }
        };

        if !state.signature_verifier.verify(&envelope).await {
            warn!(ip = %ip, "webhook_invalid_signature");
            return Err(WebhookError::InvalidSignature);
        }
    }

    match sns::classify(&payload) {
        EnvelopeKind::SubscriptionConfirmation => confirm_subscription(&state, ip, &payload).await,
        EnvelopeKind::UnsubscribeConfirmation => {
            info!(
                ip = %ip,
                topic_arn = ?payload.get("TopicArn"),
                "unsubscribe_confirmation_received"
            );
            Ok(Json(WebhookAck::new("Unsubscribe confirmation acknowledged")))
        }
        EnvelopeKind::Notification => handle_notification(&state, ip, &payload).await,
        EnvelopeKind::Unknown => {
            warn!(ip = %ip, message_type = ?payload.get("Type"), "webhook_unknown_type");
            Err(WebhookError::UnknownType)
        }
    }
}

/// Auto-confirm an SNS subscription by calling its SubscribeURL.
async fn confirm_subscription(
    state: &AppState,
    ip: IpAddr,
    payload: &Value,
) -> Result<Json<WebhookAck>, WebhookError> {
    let Some(subscribe_url) = payload.get("SubscribeURL").and_then(Value::as_str) else {
        warn!(ip = %ip, "subscription_confirmation_missing_url");
        return Err(WebhookError::MissingSubscribeUrl);
    };

    if let Err(e) = state.http.get(subscribe_url).send().await {
        error!(ip = %ip, error = %e, "subscription_confirmation_failed");
        return Err(WebhookError::SubscriptionFailed(e.to_string()));
    }

    info!(
        ip = %ip,
        topic_arn = ?payload.get("TopicArn"),
        "subscription_confirmed"
    );

    Ok(Json(WebhookAck::new("Subscription confirmed")))
}

/// Decode, classify and normalize a notification, then persist its events.
async fn handle_notification(
    state: &AppState,
    ip: IpAddr,
    payload: &Value,
) -> Result<Json<WebhookAck>, WebhookError> {
    if payload.get("Message").is_none() {
        warn!(ip = %ip, "notification_missing_message");
        return Err(WebhookError::MissingMessage);
    }

    let Some(inner) = sns::parse_inner(payload) else {
        warn!(ip = %ip, "notification_invalid_message");
        return Err(WebhookError::InvalidMessage);
    };

    let Some(events) = normalize(&inner) else {
        warn!(ip = %ip, "notification_unknown_schema");
        return Err(WebhookError::UnknownMessageKind);
    };

    // Per-row persistence: a failed insert is logged with enough context
    // for offline replay of raw_payload, and never fails the request.
    let mut stored = 0usize;
    for event in &events {
        match state.store.insert(event).await {
            Ok(_) => stored += 1,
            Err(e) => error!(
                ip = %ip,
                recipient = %event.recipient,
                event_type = %event.event_type,
                message_id = %event.message_id,
                error = %e,
                "event_store_insert_failed"
            ),
        }
    }

    info!(
        ip = %ip,
        events = events.len(),
        stored = stored,
        "notification_processed"
    );

    Ok(Json(WebhookAck::new("Notification processed")))
}

/// Resolve the client IP: first X-Forwarded-For entry, then X-Real-IP,
/// then X-Client-IP, then the socket address.
fn client_ip(headers: &HeaderMap, socket_addr: SocketAddr) -> IpAddr {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }

    for header in ["x-real-ip", "x-client-ip"] {
        if let Some(ip) = headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
        {
            return ip;
        }
    }

    socket_addr.ip()
}
