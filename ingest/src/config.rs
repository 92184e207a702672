//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables. Absent or malformed
//! values fall back to defaults - a missing setting must never stop the
//! webhook pipeline from starting.

use std::env;

use tracing::warn;

use crate::verify::aws_ip::IP_RANGES_URL;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// URL path segment the webhook is mounted under
    pub webhook_slug: String,

    /// Shared secret the SNS subscription must present as `?key=`.
    /// The check runs even when this is empty.
    pub sns_secret_key: String,

    /// Whether to require an AWS origin IP (fail-open on lookup failure)
    pub validate_aws_ip: bool,

    /// Where to fetch the AWS IP-range document
    pub aws_ip_ranges_url: String,

    /// Timeout in milliseconds for all outbound HTTP calls
    pub request_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            webhook_slug: env::var("WEBHOOK_SLUG")
                .ok()
                .map(|v| v.trim_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "ses-sns-webhook".to_string()),

            sns_secret_key: env::var("SNS_SECRET_KEY").unwrap_or_default(),

            validate_aws_ip: parse_bool("VALIDATE_AWS_IP", true),

            aws_ip_ranges_url: env::var("AWS_IP_RANGES_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| IP_RANGES_URL.to_string()),

            request_timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
        }
    }
}

/// Parse a boolean flag, accepting the usual spellings.
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean value, using default");
            default
        }
    }
}
