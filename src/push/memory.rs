/// In-process gateway for dry runs and tests
///
/// Records every batch instead of delivering it and answers receipt lookups
/// from a table seeded by the caller.
use super::{DeliveryStatus, PushGateway, PushMessage, PushReceipt, PushTicket};
use crate::error::{SteepleError, SteepleResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct MemoryGateway {
    next_id: AtomicU64,
    batches: Mutex<Vec<Vec<PushMessage>>>,
    receipts: Mutex<HashMap<String, PushReceipt>>,
    receipt_requests: Mutex<Vec<Vec<String>>>,
    send_failure: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches submitted so far, in call order
    pub fn sent_batches(&self) -> Vec<Vec<PushMessage>> {
        lock(&self.batches).clone()
    }

    pub fn sent_messages(&self) -> Vec<PushMessage> {
        lock(&self.batches).iter().flatten().cloned().collect()
    }

    /// Id lists passed to `get_receipts`, in call order
    pub fn receipt_requests(&self) -> Vec<Vec<String>> {
        lock(&self.receipt_requests).clone()
    }

    pub fn set_receipt(&self, id: &str, receipt: PushReceipt) {
        lock(&self.receipts).insert(id.to_string(), receipt);
    }

    /// Make every subsequent send fail with an upstream error
    pub fn fail_sends(&self, message: &str) {
        *lock(&self.send_failure) = Some(message.to_string());
    }
}

#[async_trait]
impl PushGateway for MemoryGateway {
    async fn send_batch(&self, batch: &[PushMessage]) -> SteepleResult<Vec<PushTicket>> {
        if let Some(message) = lock(&self.send_failure).clone() {
            return Err(SteepleError::Upstream {
                message,
                body: None,
            });
        }

        tracing::info!(messages = batch.len(), "push dry run: batch recorded");
        lock(&self.batches).push(batch.to_vec());

        Ok(batch
            .iter()
            .map(|_| PushTicket {
                id: Some(format!(
                    "dry-run-{}",
                    self.next_id.fetch_add(1, Ordering::Relaxed) + 1
                )),
                status: DeliveryStatus::Ok,
                message: None,
                details: None,
            })
            .collect())
    }

    async fn get_receipts(&self, ids: &[String]) -> SteepleResult<HashMap<String, PushReceipt>> {
        lock(&self.receipt_requests).push(ids.to_vec());

        let receipts = lock(&self.receipts);
        Ok(ids
            .iter()
            .filter_map(|id| receipts.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }
}
