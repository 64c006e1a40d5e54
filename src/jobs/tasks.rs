/// Background task implementations
use crate::{
    context::AppContext,
    error::SteepleResult,
    reminders::{ReceiptDescriptor, ReconcileReport, ReminderWindow},
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Gateway limit on ids per receipt lookup
const RECEIPT_BATCH_LIMIT: i64 = 1000;

/// How long a ticket without a receipt is kept before being given up on
const MISSING_RECEIPT_RETENTION_HOURS: i64 = 24;

/// End of the last window the scheduled dispatcher covered
#[derive(Debug, Default)]
pub struct ReminderCursor {
    last_end: Option<DateTime<Utc>>,
}

/// Run the next reminder window and store the issued tickets for later receipt checks.
///
/// The cursor only advances once the window has been dispatched, so a failed
/// run is retried by the next tick.
pub async fn dispatch_reminders(
    ctx: &AppContext,
    cursor: &mut ReminderCursor,
    now: DateTime<Utc>,
) -> SteepleResult<usize> {
    let window_minutes = ctx.config.reminders.window_minutes;
    let Some(window) = ReminderWindow::following(cursor.last_end, now, window_minutes)? else {
        return Ok(0);
    };

    let report = ctx.dispatcher.dispatch_window(window, window_minutes).await?;
    cursor.last_end = Some(window.end);

    let tickets = report.ticketed_tokens();
    ctx.push_tickets.record(&tickets).await?;

    Ok(report.messages.len())
}

/// Check receipts for stored tickets that are old enough to have one.
///
/// Tickets with a receipt are deleted. Tickets still missing one stay
/// queued until the retention period runs out.
pub async fn reconcile_stored_receipts(
    ctx: &AppContext,
    now: DateTime<Utc>,
) -> SteepleResult<ReconcileReport> {
    let cutoff = now - Duration::seconds(ctx.config.reminders.receipt_delay_secs);
    let due = ctx.push_tickets.due(cutoff, RECEIPT_BATCH_LIMIT).await?;
    if due.is_empty() {
        return Ok(ReconcileReport::default());
    }

    let descriptors = due
        .iter()
        .map(|ticket| ReceiptDescriptor {
            id: Some(ticket.ticket_id.clone()),
            token: Some(ticket.token.clone()),
        })
        .collect();
    let report = ctx.reconciler.reconcile(descriptors).await?;

    let missing: HashSet<&str> = report
        .receipts
        .iter()
        .filter(|r| r.status == "missing")
        .map(|r| r.id.as_str())
        .collect();
    let give_up_before = now - Duration::hours(MISSING_RECEIPT_RETENTION_HOURS);

    let finished: Vec<String> = due
        .iter()
        .filter(|t| !missing.contains(t.ticket_id.as_str()) || t.created_at < give_up_before)
        .map(|t| t.ticket_id.clone())
        .collect();
    ctx.push_tickets.delete(&finished).await?;

    Ok(report)
}

/// Remove magic links that can no longer be used
pub async fn purge_magic_links(ctx: &AppContext, now: DateTime<Utc>) -> SteepleResult<u64> {
    ctx.magic_links.purge_expired(now).await
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> SteepleResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ServerConfig,
        db::create_memory_pool,
        events::{NewEvent, RsvpStatus},
        notifications::Platform,
        org::{MemberRole, MemberStatus},
        push::{DeliveryStatus, MemoryGateway, PushReceipt},
    };
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (AppContext, Arc<MemoryGateway>) {
        let pool = create_memory_pool().await.unwrap();
        let gateway = Arc::new(MemoryGateway::new());
        let ctx = AppContext::with_pool(ServerConfig::development(), pool, gateway.clone());
        (ctx, gateway)
    }

    async fn seed_event(ctx: &AppContext, start_at: DateTime<Utc>) -> String {
        let org = ctx
            .memberships
            .create_organization("Grace Chapel", "grace", "UTC")
            .await
            .unwrap();
        ctx.memberships
            .upsert_membership(&org.id, "alice", MemberRole::Member, MemberStatus::Active)
            .await
            .unwrap();
        let event = ctx
            .events
            .create_event(NewEvent {
                org_id: org.id.clone(),
                title: "Choir practice".to_string(),
                description: None,
                location: None,
                start_at,
                end_at: None,
                capacity: None,
                created_by: "alice".to_string(),
            })
            .await
            .unwrap();
        ctx.events
            .upsert_rsvp(&event.id, "alice", RsvpStatus::Yes, None)
            .await
            .unwrap();
        ctx.devices
            .upsert(&org.id, "alice", "ExponentPushToken[alice]", Platform::Ios, Utc::now())
            .await
            .unwrap();
        event.id
    }

    #[tokio::test]
    async fn test_dispatch_records_tickets() {
        let (ctx, gateway) = setup().await;
        let now = Utc::now();
        seed_event(&ctx, now + Duration::minutes(30)).await;

        let sent = dispatch_reminders(&ctx, &mut ReminderCursor::default(), now)
            .await
            .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(gateway.sent_messages().len(), 1);

        let stored = ctx
            .push_tickets
            .due(Utc::now() + Duration::seconds(1), 10)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].token, "ExponentPushToken[alice]");
    }

    #[tokio::test]
    async fn test_consecutive_ticks_do_not_repeat_a_reminder() {
        let (ctx, gateway) = setup().await;
        let now = Utc::now();
        // Inside both the first window and the one a slightly early tick would cover
        seed_event(&ctx, now + Duration::seconds(30 * 60 + 50)).await;
        let mut cursor = ReminderCursor::default();

        assert_eq!(dispatch_reminders(&ctx, &mut cursor, now).await.unwrap(), 1);
        let early_tick = now + Duration::seconds(110);
        assert_eq!(dispatch_reminders(&ctx, &mut cursor, early_tick).await.unwrap(), 0);
        assert_eq!(gateway.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_keeps_tickets_without_receipts() {
        let (ctx, gateway) = setup().await;
        let now = Utc::now();
        seed_event(&ctx, now + Duration::minutes(30)).await;
        dispatch_reminders(&ctx, &mut ReminderCursor::default(), now)
            .await
            .unwrap();

        let later = Utc::now() + Duration::seconds(ctx.config.reminders.receipt_delay_secs + 1);

        let first = reconcile_stored_receipts(&ctx, later).await.unwrap();
        assert_eq!(first.processed, 1);
        assert_eq!(first.receipts[0].status, "missing");
        assert_eq!(ctx.push_tickets.due(later, 10).await.unwrap().len(), 1);

        gateway.set_receipt(
            "dry-run-1",
            PushReceipt {
                status: DeliveryStatus::Error,
                message: Some("not registered".to_string()),
                details: Some(json!({ "error": "DeviceNotRegistered" })),
            },
        );

        let second = reconcile_stored_receipts(&ctx, later).await.unwrap();
        assert_eq!(second.disabled_tokens, vec!["ExponentPushToken[alice]".to_string()]);
        assert!(ctx.push_tickets.due(later, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_with_nothing_due() {
        let (ctx, gateway) = setup().await;

        let report = reconcile_stored_receipts(&ctx, Utc::now()).await.unwrap();
        assert_eq!(report.processed, 0);
        assert!(gateway.receipt_requests().is_empty());
    }

    #[tokio::test]
    async fn test_health_check() {
        let (ctx, _) = setup().await;
        assert!(health_check(&ctx).await.is_ok());
    }
}
