//! Typed SES inner-message payloads.
//!
//! SES publishes two divergent schemas through SNS: the legacy notification
//! shape (Bounce/Complaint/Delivery under `notificationType`) and the richer
//! event-publishing shape (ten kinds under `eventType`). Both share the
//! `mail` sub-object. Every field defaults so that a sparse payload
//! deserializes cleanly - absent optional fields become empty defaults, and
//! unknown discriminator values land on an explicit `Unrecognized` variant
//! instead of failing.

use serde::Deserialize;
use serde_json::Value;

/// The `mail` sub-object common to both schemas.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mail {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub common_headers: Option<CommonHeaders>,
}

impl Mail {
    /// Subject from `commonHeaders`, empty when absent.
    pub fn subject(&self) -> String {
        self.common_headers
            .as_ref()
            .and_then(|h| h.subject.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonHeaders {
    #[serde(default)]
    pub subject: Option<String>,
}

// =============================================================================
// Legacy notification schema
// =============================================================================

/// Legacy notification discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum NotificationType {
    Bounce,
    Complaint,
    Delivery,
    #[default]
    #[serde(other)]
    Unrecognized,
}

/// A legacy "SNS Notification" message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    #[serde(default)]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub mail: Mail,
    #[serde(default)]
    pub bounce: Option<Bounce>,
    #[serde(default)]
    pub complaint: Option<Complaint>,
    #[serde(default)]
    pub delivery: Option<Delivery>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounce {
    #[serde(default)]
    pub bounce_type: String,
    #[serde(default)]
    pub bounce_sub_type: String,
    #[serde(default)]
    pub bounced_recipients: Vec<BouncedRecipient>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BouncedRecipient {
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub diagnostic_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    #[serde(default)]
    pub complaint_feedback_type: Option<String>,
    #[serde(default)]
    pub complained_recipients: Vec<ComplainedRecipient>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplainedRecipient {
    #[serde(default)]
    pub email_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    #[serde(default)]
    pub smtp_response: Option<String>,
    /// Recipients this delivery covers; the original send's destination
    /// list is used when absent.
    #[serde(default)]
    pub recipients: Option<Vec<String>>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

// =============================================================================
// Event-publishing schema
// =============================================================================

/// Event-publishing discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum EventType {
    Send,
    Reject,
    Open,
    Click,
    Bounce,
    Complaint,
    Delivery,
    DeliveryDelay,
    RenderingFailure,
    Subscription,
    #[default]
    #[serde(other)]
    Unrecognized,
}

impl EventType {
    /// Wire name, used verbatim as the stored event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Send => "Send",
            EventType::Reject => "Reject",
            EventType::Open => "Open",
            EventType::Click => "Click",
            EventType::Bounce => "Bounce",
            EventType::Complaint => "Complaint",
            EventType::Delivery => "Delivery",
            EventType::DeliveryDelay => "DeliveryDelay",
            EventType::RenderingFailure => "RenderingFailure",
            EventType::Subscription => "Subscription",
            EventType::Unrecognized => "Unrecognized",
        }
    }
}

/// An "Event Publishing" message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub mail: Mail,
    #[serde(default)]
    pub bounce: Option<Bounce>,
    #[serde(default)]
    pub complaint: Option<Complaint>,
    #[serde(default)]
    pub delivery: Option<Delivery>,
    #[serde(default)]
    pub delivery_delay: Option<DeliveryDelay>,
    #[serde(default)]
    pub open: Option<OpenEvent>,
    #[serde(default)]
    pub click: Option<ClickEvent>,
    #[serde(default)]
    pub reject: Option<Reject>,
    #[serde(default)]
    pub failure: Option<RenderingFailure>,
    #[serde(default)]
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenEvent {
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    /// Free-form tag map; preserved verbatim.
    #[serde(default)]
    pub link_tags: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reject {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDelay {
    #[serde(default)]
    pub delay_type: Option<String>,
    #[serde(default)]
    pub expiration_time: Option<String>,
    #[serde(default, rename = "reportingMTA")]
    pub reporting_mta: Option<String>,
    #[serde(default)]
    pub delayed_recipients: Vec<DelayedRecipient>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayedRecipient {
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub diagnostic_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderingFailure {
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub contact_list: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}
