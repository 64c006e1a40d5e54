/// Push notification delivery
///
/// Messages go to the Expo push service through the [`PushGateway`] trait.
/// The gateway acknowledges each message with a ticket; tickets are later
/// exchanged for delivery receipts.

pub mod expo;
pub mod memory;

pub use expo::ExpoGateway;
pub use memory::MemoryGateway;

use crate::{config::MAX_PUSH_BATCH_SIZE, error::SteepleResult, metrics};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One notification addressed to one device token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Ok,
    Error,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Ok => "ok",
            DeliveryStatus::Error => "error",
        }
    }
}

/// Gateway acknowledgement of a submitted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushTicket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Final delivery outcome for a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushReceipt {
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl PushReceipt {
    /// The gateway will never deliver to this token again
    pub fn is_device_not_registered(&self) -> bool {
        self.status == DeliveryStatus::Error
            && self
                .details
                .as_ref()
                .and_then(|d| d.get("error"))
                .and_then(Value::as_str)
                == Some("DeviceNotRegistered")
    }
}

/// Push gateway backend
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Submit one batch; tickets come back in message order
    async fn send_batch(&self, batch: &[PushMessage]) -> SteepleResult<Vec<PushTicket>>;

    /// Fetch receipts for ticket ids; unknown ids are absent from the map
    async fn get_receipts(&self, ids: &[String]) -> SteepleResult<HashMap<String, PushReceipt>>;
}

/// Submit every message in batches of at most `batch_size` (capped at the
/// gateway limit). The first failed batch aborts the whole submission.
pub async fn send_all(
    gateway: &dyn PushGateway,
    messages: &[PushMessage],
    batch_size: usize,
) -> SteepleResult<Vec<PushTicket>> {
    let batch_size = batch_size.clamp(1, MAX_PUSH_BATCH_SIZE);
    let mut tickets = Vec::with_capacity(messages.len());

    for batch in messages.chunks(batch_size) {
        match gateway.send_batch(batch).await {
            Ok(batch_tickets) => {
                metrics::record_push_sent(batch.len());
                tickets.extend(batch_tickets);
            }
            Err(e) => {
                metrics::record_push_batch_failed();
                tracing::error!(batch = batch.len(), error = %e, "push batch failed");
                return Err(e);
            }
        }
    }

    Ok(tickets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn messages(n: usize) -> Vec<PushMessage> {
        (0..n)
            .map(|i| PushMessage {
                to: format!("ExponentPushToken[{}]", i),
                title: Some("t".to_string()),
                body: None,
                sound: None,
                data: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batches_never_exceed_gateway_limit() {
        let gateway = MemoryGateway::new();
        let tickets = send_all(&gateway, &messages(181), 500).await.unwrap();

        assert_eq!(tickets.len(), 181);
        let sizes: Vec<usize> = gateway.sent_batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![90, 90, 1]);
    }

    #[tokio::test]
    async fn test_no_messages_means_no_calls() {
        let gateway = MemoryGateway::new();
        let tickets = send_all(&gateway, &[], 90).await.unwrap();
        assert!(tickets.is_empty());
        assert!(gateway.sent_batches().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_aborts() {
        let gateway = MemoryGateway::new();
        gateway.fail_sends("Expo push request failed (503)");

        let err = send_all(&gateway, &messages(3), 90).await.unwrap_err();
        assert_eq!(err.to_string(), "Expo push request failed (503)");
    }

    #[test]
    fn test_device_not_registered() {
        let dead = PushReceipt {
            status: DeliveryStatus::Error,
            message: None,
            details: Some(json!({ "error": "DeviceNotRegistered" })),
        };
        assert!(dead.is_device_not_registered());

        let throttled = PushReceipt {
            status: DeliveryStatus::Error,
            message: None,
            details: Some(json!({ "error": "MessageRateExceeded" })),
        };
        assert!(!throttled.is_device_not_registered());

        let ok = PushReceipt {
            status: DeliveryStatus::Ok,
            message: None,
            details: Some(json!({ "error": "DeviceNotRegistered" })),
        };
        assert!(!ok.is_device_not_registered());
    }

    #[test]
    fn test_message_serializes_without_empty_fields() {
        let value = serde_json::to_value(&messages(1)[0]).unwrap();
        assert_eq!(value, json!({ "to": "ExponentPushToken[0]", "title": "t" }));
    }
}
