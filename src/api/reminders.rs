/// Service endpoints driving push delivery
use super::{optional_json, JsonBody};
use crate::{
    auth::ServiceAuth,
    context::AppContext,
    db::parse_timestamp,
    error::{SteepleError, SteepleResult},
    reminders::ReceiptDescriptor,
};
use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/functions/event_reminder", post(event_reminder))
        .route("/functions/push_receipts", post(push_receipts))
}

#[derive(Debug, Default, Deserialize)]
struct ReminderPayload {
    window_minutes: Option<i64>,
    invoked_at: Option<String>,
}

/// Send reminders for events starting one window from `invoked_at`
async fn event_reminder(
    State(ctx): State<AppContext>,
    _service: ServiceAuth,
    body: Bytes,
) -> SteepleResult<Json<Value>> {
    let payload: ReminderPayload = optional_json(&body)?;

    let window_minutes = payload
        .window_minutes
        .unwrap_or(ctx.config.reminders.window_minutes);
    let invoked_at = match payload.invoked_at.as_deref() {
        Some(raw) => parse_timestamp(raw)
            .map_err(|_| SteepleError::invalid("Invalid invoked_at timestamp"))?,
        None => Utc::now(),
    };

    let report = ctx.dispatcher.dispatch(invoked_at, window_minutes).await?;

    Ok(Json(json!({
        "status": "ok",
        "events": report.events,
        "tickets": report.tickets,
        "messages": report.messages.len(),
    })))
}

#[derive(Debug, Deserialize)]
struct ReceiptsPayload {
    #[serde(default)]
    receipts: Vec<ReceiptDescriptor>,
}

/// Check delivery receipts and disable unregistered devices
async fn push_receipts(
    State(ctx): State<AppContext>,
    _service: ServiceAuth,
    WithRejection(Json(payload), _): JsonBody<ReceiptsPayload>,
) -> SteepleResult<Json<Value>> {
    let report = ctx.reconciler.reconcile(payload.receipts).await?;

    let mut body = json!({
        "status": "ok",
        "processed": report.processed,
        "disabled_tokens": report.disabled_tokens,
    });
    if !report.receipts.is_empty() {
        body["receipts"] = json!(report.receipts);
    }

    Ok(Json(body))
}
