//! SEStrack Web Server - SES delivery-event webhook receiver.
//!
//! This binary serves the SNS webhook endpoint:
//! - Verifies secret, rate limit, AWS origin IP and SNS signature
//! - Classifies and normalizes SES notifications
//! - Persists one event row per affected recipient

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sestrack::ratelimit::purge_task;
use sestrack::{build_router, AppState, Config, InMemoryEventStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        webhook_slug = %config.webhook_slug,
        secret_configured = !config.sns_secret_key.is_empty(),
        validate_aws_ip = config.validate_aws_ip,
        request_timeout_ms = config.request_timeout_ms,
        "config_loaded"
    );

    // One shared outbound client with a bounded timeout for the IP-range
    // fetch, certificate fetch and SubscribeURL confirmation.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .user_agent(concat!("sestrack/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let store = Arc::new(InMemoryEventStore::new());
    let state = AppState::new(config.clone(), http, store);

    // Periodically drop rate-limit counters whose window has elapsed.
    tokio::spawn(purge_task(
        state.rate_limiter.clone(),
        Duration::from_secs(300),
    ));

    // Build the router
    let app = build_router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
