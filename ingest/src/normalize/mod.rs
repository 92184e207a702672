//! Inner-message normalization.
//!
//! Routes a decoded inner message to the normalizer for its schema and maps
//! provider-specific JSON into canonical [`EmailEvent`] records, one per
//! affected recipient. Normalizers are pure: they never touch the store and
//! never fail - an unrecognized sub-type logs and yields no events.

pub mod event_publishing;
pub mod notification;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::sns::message::Mail;
use crate::sns::{classify_inner, InnerKind};
use crate::store::{EmailEvent, EventSource};

/// Normalize a decoded inner message into canonical events.
///
/// Returns `None` when the message matches neither schema; the caller maps
/// that to a bad-request response.
pub fn normalize(message: &Value) -> Option<Vec<EmailEvent>> {
    match classify_inner(message) {
        InnerKind::Legacy => Some(notification::normalize(message)),
        InnerKind::EventPublishing => Some(event_publishing::normalize(message)),
        InnerKind::Unknown => None,
    }
}

/// Parse an SES timestamp to absolute UTC, falling back through the mail
/// timestamp to the current time when absent or unparseable.
pub(crate) fn event_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Common event skeleton shared by every normalized record; callers fill in
/// the kind-specific fields.
pub(crate) fn base_event(
    mail: &Mail,
    notification_type: &str,
    event_type: &str,
    event_source: EventSource,
    recipient: String,
    subject: String,
    timestamp: DateTime<Utc>,
    raw_payload: &Value,
) -> EmailEvent {
    EmailEvent {
        message_id: mail.message_id.clone(),
        notification_type: notification_type.to_string(),
        event_type: event_type.to_string(),
        event_source,
        recipient,
        sender: mail.source.clone(),
        subject,
        bounce_type: None,
        bounce_subtype: None,
        complaint_type: None,
        diagnostic_code: None,
        smtp_response: None,
        event_metadata: None,
        timestamp,
        raw_payload: raw_payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_routes_legacy_schema() {
        let message = json!({
            "notificationType": "Delivery",
            "delivery": {"recipients": ["a@example.com"], "smtpResponse": "250 OK"},
            "mail": {"messageId": "m-1", "source": "s@example.com"}
        });

        let events = normalize(&message).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_source, EventSource::SnsNotification);
    }

    #[test]
    fn test_routes_event_publishing_schema() {
        let message = json!({
            "eventType": "Send",
            "mail": {"messageId": "m-1", "destination": ["a@example.com"]}
        });

        let events = normalize(&message).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_source, EventSource::EventPublishing);
    }

    #[test]
    fn test_unknown_schema_is_none() {
        assert!(normalize(&json!({"mail": {}})).is_none());
    }

    #[test]
    fn test_event_timestamp_parses_rfc3339_to_utc() {
        let ts = event_timestamp(Some("2024-05-01T12:00:00.000+02:00"));
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_event_timestamp_falls_back_to_now() {
        let before = Utc::now();
        let ts = event_timestamp(Some("yesterday-ish"));
        assert!(ts >= before);

        let ts = event_timestamp(None);
        assert!(ts >= before);
    }
}
