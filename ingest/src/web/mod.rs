//! Web server module for the SNS webhook endpoint.
//!
//! This module provides a thin, fast web server that:
//! - Receives SES delivery-event webhooks from Amazon SNS
//! - Verifies secret, origin IP and message signature
//! - Normalizes events and persists them synchronously
//! - Responds with the status codes SNS expects

pub mod error;
pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::WebhookError;
pub use handlers::{health, sns_webhook, AppState, HealthResponse, WebhookAck, WebhookQuery};

/// Assemble the application router: health check plus the webhook endpoint
/// mounted at the configured slug.
pub fn build_router(state: AppState) -> Router {
    let webhook_path = format!("/{}", state.config.webhook_slug.trim_matches('/'));

    Router::new()
        .route("/health", get(health))
        .route(&webhook_path, post(sns_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
