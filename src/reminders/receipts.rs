/// Delivery receipt reconciliation
///
/// Exchanges ticket ids for receipts and soft-disables tokens the gateway
/// reports as permanently unregistered.
use crate::{
    db::{format_timestamp, parse_timestamp},
    error::{StorageContext, SteepleResult},
    metrics,
    notifications::DeviceTokenManager,
    push::{PushGateway, PushReceipt},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;

/// Ticket to check, as supplied by the caller. Incomplete entries are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptDescriptor {
    pub id: Option<String>,
    pub token: Option<String>,
}

/// Per-ticket outcome, echoing the gateway receipt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptOutcome {
    pub id: String,
    pub token: String,
    /// `ok`, `error`, or `missing` when the gateway has no receipt yet
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub processed: usize,
    pub disabled_tokens: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub receipts: Vec<ReceiptOutcome>,
}

#[derive(Clone)]
pub struct ReceiptReconciler {
    devices: DeviceTokenManager,
    push: Arc<dyn PushGateway>,
}

impl ReceiptReconciler {
    pub fn new(devices: DeviceTokenManager, push: Arc<dyn PushGateway>) -> Self {
        Self { devices, push }
    }

    pub async fn reconcile(&self, descriptors: Vec<ReceiptDescriptor>) -> SteepleResult<ReconcileReport> {
        let pending: Vec<(String, String)> = descriptors
            .into_iter()
            .filter_map(|d| match (d.id, d.token) {
                (Some(id), Some(token)) if !id.is_empty() && !token.is_empty() => Some((id, token)),
                _ => None,
            })
            .collect();

        if pending.is_empty() {
            return Ok(ReconcileReport::default());
        }

        let ids: Vec<String> = pending.iter().map(|(id, _)| id.clone()).collect();
        let found = self.push.get_receipts(&ids).await?;

        let mut seen = HashSet::new();
        let mut disabled_tokens = Vec::new();
        let mut receipts = Vec::with_capacity(pending.len());

        for (id, token) in pending {
            let Some(receipt) = found.get(&id) else {
                receipts.push(ReceiptOutcome {
                    id,
                    token,
                    status: "missing".to_string(),
                    message: None,
                    details: None,
                });
                continue;
            };

            if receipt.is_device_not_registered() && seen.insert(token.clone()) {
                disabled_tokens.push(token.clone());
            }
            receipts.push(outcome(id, token, receipt));
        }

        if !disabled_tokens.is_empty() {
            self.devices
                .disable_tokens(&disabled_tokens)
                .await
                .storage_context("device_tokens.update", "Failed to disable tokens")?;
            metrics::record_tokens_disabled(disabled_tokens.len());
            tracing::info!(count = disabled_tokens.len(), "disabled unregistered device tokens");
        }

        Ok(ReconcileReport {
            processed: receipts.len(),
            disabled_tokens,
            receipts,
        })
    }
}

fn outcome(id: String, token: String, receipt: &PushReceipt) -> ReceiptOutcome {
    ReceiptOutcome {
        id,
        token,
        status: receipt.status.as_str().to_string(),
        message: receipt.message.clone(),
        details: receipt.details.clone(),
    }
}

/// A ticket issued by a scheduled dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRecord {
    pub ticket_id: String,
    pub token: String,
    pub event_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredTicket {
    pub ticket_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Tickets awaiting a receipt check
#[derive(Clone)]
pub struct PushTicketStore {
    db: SqlitePool,
}

impl PushTicketStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn record(&self, tickets: &[TicketRecord]) -> SteepleResult<()> {
        if tickets.is_empty() {
            return Ok(());
        }

        let now = format_timestamp(Utc::now());
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT OR IGNORE INTO push_tickets (ticket_id, token, event_id, created_at) ");
        query.push_values(tickets, |mut row, ticket| {
            row.push_bind(&ticket.ticket_id)
                .push_bind(&ticket.token)
                .push_bind(&ticket.event_id)
                .push_bind(now.clone());
        });

        query.build().execute(&self.db).await?;
        Ok(())
    }

    /// Oldest tickets created at or before `cutoff`
    pub async fn due(&self, cutoff: DateTime<Utc>, limit: i64) -> SteepleResult<Vec<StoredTicket>> {
        let rows = sqlx::query(
            r#"
            SELECT ticket_id, token, created_at
            FROM push_tickets
            WHERE created_at <= ?
            ORDER BY created_at
            LIMIT ?
            "#,
        )
        .bind(format_timestamp(cutoff))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                Ok(StoredTicket {
                    ticket_id: row.get("ticket_id"),
                    token: row.get("token"),
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    pub async fn delete(&self, ticket_ids: &[String]) -> SteepleResult<u64> {
        if ticket_ids.is_empty() {
            return Ok(0);
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM push_tickets WHERE ticket_id IN (");
        let mut separated = query.separated(", ");
        for id in ticket_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let result = query.build().execute(&self.db).await?;
        Ok(result.rows_affected())
    }
}
