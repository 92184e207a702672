//! Canonical email-event records and the persistence contract.
//!
//! Normalizers emit one [`EmailEvent`] per (event, recipient) pair; the
//! orchestrator hands each to an [`EventStore`]. Events are append-only:
//! this pipeline never updates or deletes a stored row (retention is an
//! external housekeeping concern).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

/// Identifier of a persisted event row.
pub type RowId = u64;

/// Which subsystem produced an event.
///
/// `Manual` rows are written by the out-of-scope manual-tracking subsystem;
/// this pipeline only ever emits the first two but must tolerate all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    SnsNotification,
    EventPublishing,
    Manual,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::SnsNotification => "sns_notification",
            EventSource::EventPublishing => "event_publishing",
            EventSource::Manual => "manual",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized delivery event for one recipient.
///
/// `raw_payload` always retains the full original inner message so any
/// stored row can be replayed or re-normalized offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailEvent {
    pub message_id: String,
    pub notification_type: String,
    pub event_type: String,
    pub event_source: EventSource,
    pub recipient: String,
    pub sender: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounce_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounce_subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complaint_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp_response: Option<String>,
    /// Per-kind extras (open/click device info, delay details, ...).
    /// Absent keys are omitted, never serialized as null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_metadata: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub raw_payload: Value,
}

/// Store failures. Per-row failures are logged by the orchestrator and
/// never surfaced to the webhook caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("insert rejected: {0}")]
    Rejected(String),
}

/// Durable append-only event table, reduced to the single contract this
/// pipeline needs.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: &EmailEvent) -> Result<RowId, StoreError>;
}

/// In-memory store for tests and lightweight deployments.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<EmailEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything inserted so far.
    pub async fn events(&self) -> Vec<EmailEvent> {
        self.events.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, event: &EmailEvent) -> Result<RowId, StoreError> {
        let mut events = self.events.lock().await;
        events.push(event.clone());
        Ok(events.len() as RowId)
    }
}
