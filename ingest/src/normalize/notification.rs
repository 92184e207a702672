//! Legacy "SNS Notification" normalizer (Bounce, Complaint, Delivery).
//!
//! The legacy schema stores lowercase event types; the notification type
//! keeps its wire casing. Timestamps come from the mail object.

use serde_json::Value;
use tracing::{debug, warn};

use super::{base_event, event_timestamp};
use crate::sns::message::{NotificationMessage, NotificationType};
use crate::store::{EmailEvent, EventSource};

/// Map a legacy notification to one event per affected recipient.
pub fn normalize(message: &Value) -> Vec<EmailEvent> {
    let parsed: NotificationMessage = match serde_json::from_value(message.clone()) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "notification_parse_failed");
            return Vec::new();
        }
    };

    let mail = &parsed.mail;
    let subject = mail.subject();
    let timestamp = event_timestamp(mail.timestamp.as_deref());

    match parsed.notification_type {
        NotificationType::Bounce => {
            let bounce = parsed.bounce.unwrap_or_default();
            bounce
                .bounced_recipients
                .iter()
                .map(|recipient| EmailEvent {
                    bounce_type: Some(bounce.bounce_type.clone()),
                    bounce_subtype: Some(bounce.bounce_sub_type.clone()),
                    diagnostic_code: Some(
                        recipient.diagnostic_code.clone().unwrap_or_default(),
                    ),
                    ..base_event(
                        mail,
                        "Bounce",
                        "bounce",
                        EventSource::SnsNotification,
                        recipient.email_address.clone(),
                        subject.clone(),
                        timestamp,
                        message,
                    )
                })
                .collect()
        }

        NotificationType::Complaint => {
            let complaint = parsed.complaint.unwrap_or_default();
            let complaint_type = complaint.complaint_feedback_type.unwrap_or_default();
            complaint
                .complained_recipients
                .iter()
                .map(|recipient| EmailEvent {
                    complaint_type: Some(complaint_type.clone()),
                    ..base_event(
                        mail,
                        "Complaint",
                        "complaint",
                        EventSource::SnsNotification,
                        recipient.email_address.clone(),
                        subject.clone(),
                        timestamp,
                        message,
                    )
                })
                .collect()
        }

        NotificationType::Delivery => {
            let delivery = parsed.delivery.unwrap_or_default();
            let smtp_response = delivery.smtp_response.unwrap_or_default();
            // Deliveries may omit their recipient list; fall back to the
            // original send's destination.
            let recipients = delivery
                .recipients
                .unwrap_or_else(|| mail.destination.clone());
            recipients
                .into_iter()
                .map(|recipient| EmailEvent {
                    smtp_response: Some(smtp_response.clone()),
                    ..base_event(
                        mail,
                        "Delivery",
                        "delivery",
                        EventSource::SnsNotification,
                        recipient,
                        subject.clone(),
                        timestamp,
                        message,
                    )
                })
                .collect()
        }

        NotificationType::Unrecognized => {
            debug!(
                notification_type = ?message.get("notificationType"),
                "notification_type_ignored"
            );
            Vec::new()
        }
    }
}
