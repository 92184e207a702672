//! SES Event Publishing normalizer (Send, Reject, Open, Click, Bounce,
//! Complaint, Delivery, DeliveryDelay, RenderingFailure, Subscription).
//!
//! Event-publishing rows keep the CamelCase wire name as both the
//! notification type and the event type. Each sub-event nests its own
//! timestamp, preferred over the mail timestamp.

use serde_json::{Map, Value};
use tracing::warn;

use super::{base_event, event_timestamp};
use crate::sns::message::{ClickEvent, EventMessage, EventType, OpenEvent};
use crate::store::{EmailEvent, EventSource};

/// Map an event-publishing message to one event per affected recipient.
pub fn normalize(message: &Value) -> Vec<EmailEvent> {
    let parsed: EventMessage = match serde_json::from_value(message.clone()) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "event_publishing_parse_failed");
            return Vec::new();
        }
    };

    let mail = &parsed.mail;
    let kind = parsed.event_type.as_str();
    let subject = mail.subject();
    let mail_ts = mail.timestamp.as_deref();

    // Fans an event out to the original send's destination list.
    let fan_out = |subject: &str,
                   timestamp: chrono::DateTime<chrono::Utc>,
                   metadata: Option<Value>| {
        mail.destination
            .iter()
            .map(|recipient| EmailEvent {
                event_metadata: metadata.clone(),
                ..base_event(
                    mail,
                    kind,
                    kind,
                    EventSource::EventPublishing,
                    recipient.clone(),
                    subject.to_string(),
                    timestamp,
                    message,
                )
            })
            .collect::<Vec<_>>()
    };

    match parsed.event_type {
        EventType::Send => fan_out(&subject, event_timestamp(mail_ts), None),

        EventType::Reject => {
            let reason = parsed
                .reject
                .and_then(|r| r.reason)
                .unwrap_or_default();
            let mut metadata = Map::new();
            metadata.insert("reason".to_string(), Value::String(reason));
            fan_out(&subject, event_timestamp(None), Some(Value::Object(metadata)))
        }

        EventType::Open => {
            let open = parsed.open.unwrap_or_default();
            let timestamp = event_timestamp(open.timestamp.as_deref().or(mail_ts));
            fan_out(&subject, timestamp, open_metadata(&open))
        }

        EventType::Click => {
            let click = parsed.click.unwrap_or_default();
            let timestamp = event_timestamp(click.timestamp.as_deref().or(mail_ts));
            fan_out(&subject, timestamp, click_metadata(&click))
        }

        EventType::Bounce => {
            let bounce = parsed.bounce.unwrap_or_default();
            let timestamp = event_timestamp(bounce.timestamp.as_deref().or(mail_ts));
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
                        kind,
                        kind,
                        EventSource::EventPublishing,
                        recipient.email_address.clone(),
                        subject.clone(),
                        timestamp,
                        message,
                    )
                })
                .collect()
        }

        EventType::Complaint => {
            let complaint = parsed.complaint.unwrap_or_default();
            let complaint_type = complaint.complaint_feedback_type.unwrap_or_default();
            let timestamp = event_timestamp(complaint.timestamp.as_deref().or(mail_ts));
            complaint
                .complained_recipients
                .iter()
                .map(|recipient| EmailEvent {
                    complaint_type: Some(complaint_type.clone()),
                    ..base_event(
                        mail,
                        kind,
                        kind,
                        EventSource::EventPublishing,
                        recipient.email_address.clone(),
                        subject.clone(),
                        timestamp,
                        message,
                    )
                })
                .collect()
        }

        EventType::Delivery => {
            let delivery = parsed.delivery.unwrap_or_default();
            let smtp_response = delivery.smtp_response.unwrap_or_default();
            let timestamp = event_timestamp(delivery.timestamp.as_deref().or(mail_ts));
            delivery
                .recipients
                .unwrap_or_default()
                .into_iter()
                .map(|recipient| EmailEvent {
                    smtp_response: Some(smtp_response.clone()),
                    ..base_event(
                        mail,
                        kind,
                        kind,
                        EventSource::EventPublishing,
                        recipient,
                        subject.clone(),
                        timestamp,
                        message,
                    )
                })
                .collect()
        }

        EventType::DeliveryDelay => {
            let delay = parsed.delivery_delay.unwrap_or_default();
            let timestamp = event_timestamp(delay.timestamp.as_deref().or(mail_ts));

            let mut metadata = Map::new();
            metadata.insert(
                "delay_type".to_string(),
                Value::String(delay.delay_type.clone().unwrap_or_default()),
            );
            metadata.insert(
                "expiration_time".to_string(),
                Value::String(delay.expiration_time.clone().unwrap_or_default()),
            );
            metadata.insert(
                "reporting_mta".to_string(),
                Value::String(delay.reporting_mta.clone().unwrap_or_default()),
            );
            let metadata = Value::Object(metadata);

            delay
                .delayed_recipients
                .iter()
                .map(|recipient| EmailEvent {
                    event_metadata: Some(metadata.clone()),
                    ..base_event(
                        mail,
                        kind,
                        kind,
                        EventSource::EventPublishing,
                        recipient.email_address.clone(),
                        subject.clone(),
                        timestamp,
                        message,
                    )
                })
                .collect()
        }

        EventType::RenderingFailure => {
            let failure = parsed.failure.unwrap_or_default();
            let mut metadata = Map::new();
            metadata.insert(
                "template_name".to_string(),
                Value::String(failure.template_name.unwrap_or_default()),
            );
            metadata.insert(
                "error_message".to_string(),
                Value::String(failure.error_message.unwrap_or_default()),
            );
            // A rendering failure never made it to a rendered subject.
            fan_out("", event_timestamp(None), Some(Value::Object(metadata)))
        }

        EventType::Subscription => {
            let subscription = parsed.subscription.unwrap_or_default();
            let timestamp = event_timestamp(subscription.timestamp.as_deref().or(mail_ts));

            let mut metadata = Map::new();
            metadata.insert(
                "contact_list".to_string(),
                Value::String(subscription.contact_list.unwrap_or_default()),
            );
            metadata.insert(
                "timestamp".to_string(),
                Value::String(subscription.timestamp.unwrap_or_default()),
            );
            fan_out("", timestamp, Some(Value::Object(metadata)))
        }

        EventType::Unrecognized => {
            warn!(
                event_type = ?message.get("eventType"),
                "event_publishing_unknown_type"
            );
            Vec::new()
        }
    }
}

/// Open metadata: only keys the payload actually carried.
fn open_metadata(open: &OpenEvent) -> Option<Value> {
    let mut metadata = Map::new();
    if let Some(ip) = &open.ip_address {
        metadata.insert("ip_address".to_string(), Value::String(ip.clone()));
    }
    if let Some(agent) = &open.user_agent {
        metadata.insert("user_agent".to_string(), Value::String(agent.clone()));
    }
    if let Some(ts) = &open.timestamp {
        metadata.insert("timestamp".to_string(), Value::String(ts.clone()));
    }
    Some(Value::Object(metadata))
}

/// Click metadata: device info plus the clicked link, keys present only when
/// provided by the source payload.
fn click_metadata(click: &ClickEvent) -> Option<Value> {
    let mut metadata = Map::new();
    if let Some(ip) = &click.ip_address {
        metadata.insert("ip_address".to_string(), Value::String(ip.clone()));
    }
    if let Some(agent) = &click.user_agent {
        metadata.insert("user_agent".to_string(), Value::String(agent.clone()));
    }
    if let Some(link) = &click.link {
        metadata.insert("link".to_string(), Value::String(link.clone()));
    }
    if let Some(tags) = &click.link_tags {
        metadata.insert("link_tags".to_string(), tags.clone());
    }
    if let Some(ts) = &click.timestamp {
        metadata.insert("timestamp".to_string(), Value::String(ts.clone()));
    }
    Some(Value::Object(metadata))
}
