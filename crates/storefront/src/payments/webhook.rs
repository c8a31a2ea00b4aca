//! Square webhook verification and parsing.
//!
//! Square signs each notification with HMAC-SHA256 over the notification URL
//! followed by the raw body, base64 encoded in [`SIGNATURE_HEADER`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gi_foundation_core::PaymentStatus;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use super::PaymentError;

/// Header carrying the notification signature.
pub const SIGNATURE_HEADER: &str = "x-square-hmacsha256-signature";

type HmacSha256 = Hmac<Sha256>;

/// Check a notification signature in constant time.
#[must_use]
pub fn verify_signature(key: &str, notification_url: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(notification_url.as_bytes());
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// What the storefront should do for one webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    PaymentUpdated {
        payment_id: String,
        status: PaymentStatus,
        amount_minor: Option<i64>,
    },
    PaymentCreated {
        payment_id: String,
    },
    RefundCreated {
        refund_id: String,
        payment_id: String,
    },
    Ignored {
        event_type: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Notification {
    Batch { events: Vec<Event> },
    Single(Event),
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    data: Value,
}

impl Event {
    /// `data.object.<name>`, falling back to `data.<name>`.
    fn object(&self, name: &str) -> Option<&Value> {
        self.data
            .get("object")
            .and_then(|object| object.get(name))
            .or_else(|| self.data.get(name))
    }

    fn action(&self) -> Option<WebhookAction> {
        let str_field = |value: &Value, key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        match self.event_type.as_str() {
            "payment.updated" => {
                let payment = self.object("payment")?;
                Some(WebhookAction::PaymentUpdated {
                    payment_id: str_field(payment, "id")?,
                    status: PaymentStatus::from_processor(
                        payment.get("status").and_then(Value::as_str).unwrap_or_default(),
                    ),
                    amount_minor: payment
                        .get("amount_money")
                        .and_then(|m| m.get("amount"))
                        .and_then(Value::as_i64),
                })
            }
            "payment.created" => {
                let payment = self.object("payment")?;
                Some(WebhookAction::PaymentCreated {
                    payment_id: str_field(payment, "id")?,
                })
            }
            "refund.created" => {
                let refund = self.object("refund")?;
                Some(WebhookAction::RefundCreated {
                    refund_id: str_field(refund, "id")?,
                    payment_id: str_field(refund, "payment_id")?,
                })
            }
            other => Some(WebhookAction::Ignored {
                event_type: other.to_string(),
            }),
        }
    }
}

/// Parse a notification body into actions.
///
/// Accepts a single Square event or an `{ "events": [...] }` batch. Known
/// events missing their ids are dropped.
///
/// # Errors
///
/// Returns `PaymentError::Parse` if the body is not a JSON event.
pub fn parse_webhook(body: &[u8]) -> Result<Vec<WebhookAction>, PaymentError> {
    let notification: Notification =
        serde_json::from_slice(body).map_err(|e| PaymentError::Parse(e.to_string()))?;
    let events = match notification {
        Notification::Batch { events } => events,
        Notification::Single(event) => vec![event],
    };
    Ok(events.iter().filter_map(Event::action).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sign(key: &str, url: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
        mac.update(url.as_bytes());
        mac.update(body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_signature_roundtrip() {
        let body = br#"{"type":"payment.created"}"#;
        let url = "https://example.org/api/payments/webhook";
        let signature = sign("whsec", url, body);

        assert!(verify_signature("whsec", url, body, &signature));
        assert!(!verify_signature("other", url, body, &signature));
        assert!(!verify_signature("whsec", "https://evil.example", body, &signature));
        assert!(!verify_signature("whsec", url, body, "not base64!"));
    }

    #[test]
    fn test_parse_square_event() {
        let body = br#"{
            "merchant_id": "M1",
            "type": "payment.updated",
            "event_id": "e1",
            "data": {"type": "payment", "id": "pay_1", "object": {"payment": {
                "id": "pay_1", "status": "COMPLETED",
                "amount_money": {"amount": 2500, "currency": "USD"}
            }}}
        }"#;
        let actions = parse_webhook(body).unwrap();
        assert_eq!(
            actions,
            vec![WebhookAction::PaymentUpdated {
                payment_id: "pay_1".to_string(),
                status: PaymentStatus::Completed,
                amount_minor: Some(2500),
            }]
        );
    }

    #[test]
    fn test_parse_batch_with_refund_and_unknown() {
        let body = br#"{"events": [
            {"type": "refund.created", "data": {"refund": {"id": "r1", "payment_id": "pay_1"}}},
            {"type": "payment.created", "data": {"payment": {}}},
            {"type": "invoice.paid", "data": {}}
        ]}"#;
        let actions = parse_webhook(body).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            WebhookAction::RefundCreated {
                refund_id: "r1".to_string(),
                payment_id: "pay_1".to_string(),
            }
        );
        assert!(matches!(&actions[1], WebhookAction::Ignored { event_type } if event_type == "invoice.paid"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_webhook(b"not json").is_err());
    }
}
