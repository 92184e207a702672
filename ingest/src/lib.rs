//! SEStrack - Amazon SES delivery-event ingestion.
//!
//! This library implements the webhook ingestion and verification pipeline
//! behind the `sestrack-web` binary:
//!
//! ```text
//! SNS webhook → [rate limit, secret, AWS IP, signature] → detect →
//!     normalize (legacy | event publishing) → event store
//! ```
//!
//! Verification layers are independent: the shared secret is always
//! enforced, the AWS-IP check fails open on lookup failure, and the SNS
//! signature check fails closed.

pub mod cache;
pub mod config;
pub mod normalize;
pub mod ratelimit;
pub mod sns;
pub mod store;
pub mod verify;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use ratelimit::RateLimiter;
pub use sns::{EnvelopeKind, InnerKind, SnsEnvelope};
pub use store::{EmailEvent, EventSource, EventStore, InMemoryEventStore};
pub use verify::{AwsIpValidator, SignatureVerifier};
pub use web::{build_router, AppState};
