//! SNS envelope model and message-type detection.
//!
//! An inbound webhook body is the outer JSON wrapper SNS posts to an HTTPS
//! subscriber. Detection is two-staged: the envelope `Type` field picks the
//! envelope kind, and for notifications the JSON-decoded `Message` field is
//! classified into one of the two SES schemas by its discriminator key
//! (`notificationType` for legacy notifications, `eventType` for event
//! publishing).

pub mod message;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The outer JSON wrapper AWS SNS sends to an HTTPS webhook subscriber.
///
/// Every field is optional at the parse level; presence requirements are
/// enforced by the consuming component (the signature verifier rejects an
/// envelope missing its required fields, the orchestrator rejects a
/// notification without `Message`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnsEnvelope {
    #[serde(rename = "Type")]
    pub message_type: Option<String>,
    #[serde(rename = "MessageId")]
    pub message_id: Option<String>,
    #[serde(rename = "TopicArn")]
    pub topic_arn: Option<String>,
    #[serde(rename = "Timestamp")]
    pub timestamp: Option<String>,
    #[serde(rename = "SignatureVersion")]
    pub signature_version: Option<String>,
    #[serde(rename = "Signature")]
    pub signature: Option<String>,
    #[serde(rename = "SigningCertURL")]
    pub signing_cert_url: Option<String>,
    /// Opaque JSON string carrying the inner SES message.
    #[serde(rename = "Message")]
    pub message: Option<String>,
    #[serde(rename = "SubscribeURL")]
    pub subscribe_url: Option<String>,
    #[serde(rename = "Token")]
    pub token: Option<String>,
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
}

impl SnsEnvelope {
    /// Look up an envelope field by its wire name. Used by the signature
    /// verifier to rebuild the canonical string-to-sign.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "Type" => self.message_type.as_deref(),
            "MessageId" => self.message_id.as_deref(),
            "TopicArn" => self.topic_arn.as_deref(),
            "Timestamp" => self.timestamp.as_deref(),
            "Message" => self.message.as_deref(),
            "SubscribeURL" => self.subscribe_url.as_deref(),
            "Token" => self.token.as_deref(),
            "Subject" => self.subject.as_deref(),
            _ => None,
        }
    }
}

/// Envelope classification by the SNS `Type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    SubscriptionConfirmation,
    Notification,
    UnsubscribeConfirmation,
    Unknown,
}

/// Classify a raw SNS payload purely by its `Type` field.
pub fn classify(payload: &Value) -> EnvelopeKind {
    match payload.get("Type").and_then(Value::as_str) {
        Some("SubscriptionConfirmation") => EnvelopeKind::SubscriptionConfirmation,
        Some("Notification") => EnvelopeKind::Notification,
        Some("UnsubscribeConfirmation") => EnvelopeKind::UnsubscribeConfirmation,
        _ => EnvelopeKind::Unknown,
    }
}

/// Decode the envelope's `Message` field as JSON.
///
/// Returns `None` when the field is absent, is not valid JSON, or does not
/// decode to a JSON object.
pub fn parse_inner(payload: &Value) -> Option<Value> {
    let raw = payload.get("Message")?.as_str()?;
    let inner: Value = serde_json::from_str(raw).ok()?;
    inner.is_object().then_some(inner)
}

/// Inner-message schema classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerKind {
    /// Legacy "SNS Notification" schema (`notificationType` discriminator).
    Legacy,
    /// "Event Publishing" schema (`eventType` discriminator).
    EventPublishing,
    Unknown,
}

/// Classify a decoded inner message. The legacy discriminator wins when
/// both are present; the two schemas are mutually exclusive on real
/// payloads.
pub fn classify_inner(message: &Value) -> InnerKind {
    if message.get("notificationType").is_some() {
        InnerKind::Legacy
    } else if message.get("eventType").is_some() {
        InnerKind::EventPublishing
    } else {
        InnerKind::Unknown
    }
}
