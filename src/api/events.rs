/// Event listing, publishing and RSVP endpoints
use super::{org_session, require_fields, JsonBody};
use crate::{
    auth::Credentials,
    context::AppContext,
    db::parse_timestamp,
    error::{StorageContext, SteepleError, SteepleResult},
    events::{NewEvent, RsvpStatus},
    org::OrgSession,
    policy::Action,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route("/events/:id", get(event_detail))
        .route("/events/:id/rsvp", post(rsvp))
}

#[derive(Debug, Deserialize)]
struct OrgQuery {
    org_id: Option<String>,
}

async fn list_events(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Query(query): Query<OrgQuery>,
) -> SteepleResult<Json<Value>> {
    require_fields(&[query.org_id.as_deref()], &["org_id"])?;
    let org_id = query.org_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::ViewContent).await?;

    let events = ctx
        .events
        .list_events(&session.org_id)
        .await
        .storage_context("events.select", "Failed to load events")?;

    Ok(Json(json!({ "events": events })))
}

#[derive(Debug, Deserialize)]
struct CreateEventPayload {
    org_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start_at: Option<String>,
    end_at: Option<String>,
    capacity: Option<i64>,
}

fn parse_field(raw: &str, field: &str) -> SteepleResult<DateTime<Utc>> {
    parse_timestamp(raw).map_err(|_| SteepleError::invalid(format!("Invalid {} timestamp", field)))
}

/// Staff publish an event to their org
async fn create_event(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    WithRejection(Json(payload), _): JsonBody<CreateEventPayload>,
) -> SteepleResult<Json<Value>> {
    require_fields(
        &[
            payload.org_id.as_deref(),
            payload.title.as_deref(),
            payload.start_at.as_deref(),
        ],
        &["org_id", "title", "start_at"],
    )?;
    let start_at = parse_field(payload.start_at.as_deref().unwrap_or_default(), "start_at")?;
    let end_at = payload
        .end_at
        .as_deref()
        .map(|raw| parse_field(raw, "end_at"))
        .transpose()?;
    if end_at.is_some_and(|end| end < start_at) {
        return Err(SteepleError::invalid("end_at must not be before start_at"));
    }
    if payload.capacity.is_some_and(|c| c < 1) {
        return Err(SteepleError::invalid("capacity must be positive"));
    }
    let org_id = payload.org_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::PublishContent).await?;

    let event = ctx
        .events
        .create_event(NewEvent {
            org_id: session.org_id.clone(),
            title: payload.title.unwrap_or_default(),
            description: payload.description.filter(|d| !d.is_empty()),
            location: payload.location.filter(|l| !l.is_empty()),
            start_at,
            end_at,
            capacity: payload.capacity,
            created_by: session.user_id.clone(),
        })
        .await
        .storage_context("events.insert", "Failed to create event")?;

    tracing::info!(event_id = %event.id, org_id = %event.org_id, "event published");

    Ok(Json(json!({ "status": "ok", "event": event })))
}

/// Event with its attendee count and the caller's own RSVP
async fn event_detail(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Path(event_id): Path<String>,
) -> SteepleResult<Json<Value>> {
    let auth = credentials.authenticate(&ctx.config.authentication)?;

    let event = ctx
        .events
        .get_event(&event_id)
        .await
        .storage_context("events.select", "Failed to load event")?
        .ok_or_else(|| SteepleError::NotFound("Event not found".to_string()))?;

    let session =
        OrgSession::establish(&ctx.memberships, &auth, &event.org_id, Action::ViewContent).await?;

    let (attendee_count, user_rsvp) = tokio::try_join!(
        ctx.events.attendee_count(&event.id),
        ctx.events.rsvp_status(&event.id, &session.user_id),
    )
    .storage_context("rsvps.select", "Failed to load RSVPs")?;

    Ok(Json(json!({
        "event": event,
        "attendee_count": attendee_count,
        "user_rsvp": user_rsvp,
    })))
}

#[derive(Debug, Deserialize)]
struct RsvpPayload {
    status: Option<String>,
    notes: Option<String>,
}

async fn rsvp(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Path(event_id): Path<String>,
    WithRejection(Json(payload), _): JsonBody<RsvpPayload>,
) -> SteepleResult<Json<Value>> {
    require_fields(&[payload.status.as_deref()], &["status"])?;
    let status: RsvpStatus = payload.status.as_deref().unwrap_or_default().parse()?;

    let auth = credentials.authenticate(&ctx.config.authentication)?;

    let event = ctx
        .events
        .get_event(&event_id)
        .await
        .storage_context("events.select", "Failed to load event")?
        .ok_or_else(|| SteepleError::NotFound("Event not found".to_string()))?;

    let session = OrgSession::establish(&ctx.memberships, &auth, &event.org_id, Action::Rsvp).await?;

    let rsvp = ctx
        .events
        .upsert_rsvp(&event.id, &session.user_id, status, payload.notes)
        .await
        .storage_context("rsvps.upsert", "Failed to save RSVP")?;

    Ok(Json(json!({ "status": "ok", "rsvp": rsvp })))
}
