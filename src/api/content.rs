/// Announcement and devotional endpoints
use super::{org_session, require_fields, JsonBody};
use crate::{
    auth::Credentials,
    content::{NewAnnouncement, NewDevotional},
    context::AppContext,
    db::parse_timestamp,
    error::{StorageContext, SteepleError, SteepleResult},
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
        .route("/announcements", get(list_announcements).post(publish_announcement))
        .route("/announcements/:id", get(announcement_detail))
        .route("/devotionals", post(publish_devotional))
        .route("/devotionals/latest", get(latest_devotional))
}

#[derive(Debug, Deserialize)]
struct OrgQuery {
    org_id: Option<String>,
}

fn optional_timestamp(raw: Option<&str>, field: &str) -> SteepleResult<Option<DateTime<Utc>>> {
    raw.filter(|r| !r.is_empty())
        .map(|r| {
            parse_timestamp(r)
                .map_err(|_| SteepleError::invalid(format!("Invalid {} timestamp", field)))
        })
        .transpose()
}

async fn list_announcements(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Query(query): Query<OrgQuery>,
) -> SteepleResult<Json<Value>> {
    require_fields(&[query.org_id.as_deref()], &["org_id"])?;
    let org_id = query.org_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::ViewContent).await?;

    let announcements = ctx
        .announcements
        .list_current(&session.org_id, Utc::now())
        .await
        .storage_context("announcements.select", "Failed to load announcements")?;

    Ok(Json(json!({ "announcements": announcements })))
}

async fn announcement_detail(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Path(announcement_id): Path<String>,
) -> SteepleResult<Json<Value>> {
    let auth = credentials.authenticate(&ctx.config.authentication)?;

    let announcement = ctx
        .announcements
        .get_visible(&announcement_id)
        .await
        .storage_context("announcements.select", "Failed to load announcement")?
        .ok_or_else(|| SteepleError::NotFound("Announcement not found".to_string()))?;

    OrgSession::establish(&ctx.memberships, &auth, &announcement.org_id, Action::ViewContent)
        .await?;

    Ok(Json(json!({ "announcement": announcement })))
}

#[derive(Debug, Deserialize)]
struct AnnouncementPayload {
    org_id: Option<String>,
    title: Option<String>,
    body: Option<String>,
    #[serde(default)]
    pinned: bool,
    published_at: Option<String>,
    expires_at: Option<String>,
}

/// Staff publish an announcement, immediately unless `published_at` is later
async fn publish_announcement(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    WithRejection(Json(payload), _): JsonBody<AnnouncementPayload>,
) -> SteepleResult<Json<Value>> {
    require_fields(
        &[
            payload.org_id.as_deref(),
            payload.title.as_deref(),
            payload.body.as_deref(),
        ],
        &["org_id", "title", "body"],
    )?;
    let published_at = optional_timestamp(payload.published_at.as_deref(), "published_at")?
        .unwrap_or_else(Utc::now);
    let expires_at = optional_timestamp(payload.expires_at.as_deref(), "expires_at")?;
    if expires_at.is_some_and(|end| end <= published_at) {
        return Err(SteepleError::invalid("expires_at must be after published_at"));
    }
    let org_id = payload.org_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::PublishContent).await?;

    let announcement = ctx
        .announcements
        .create(
            &session.org_id,
            &session.user_id,
            NewAnnouncement {
                title: payload.title.unwrap_or_default(),
                body: payload.body.unwrap_or_default(),
                pinned: payload.pinned,
                published_at,
                expires_at,
            },
        )
        .await
        .storage_context("announcements.insert", "Failed to publish announcement")?;

    tracing::info!(announcement_id = %announcement.id, org_id = %announcement.org_id, "announcement published");

    Ok(Json(json!({ "status": "ok", "announcement": announcement })))
}

async fn latest_devotional(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Query(query): Query<OrgQuery>,
) -> SteepleResult<Json<Value>> {
    require_fields(&[query.org_id.as_deref()], &["org_id"])?;
    let org_id = query.org_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::ViewContent).await?;

    let devotional = ctx
        .devotionals
        .latest(&session.org_id, Utc::now())
        .await
        .storage_context("devotionals.select", "Failed to load devotional")?;

    Ok(Json(json!({ "devotional": devotional })))
}

#[derive(Debug, Deserialize)]
struct DevotionalPayload {
    org_id: Option<String>,
    title: Option<String>,
    body: Option<String>,
    scripture_reference: Option<String>,
    published_at: Option<String>,
}

async fn publish_devotional(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    WithRejection(Json(payload), _): JsonBody<DevotionalPayload>,
) -> SteepleResult<Json<Value>> {
    require_fields(
        &[
            payload.org_id.as_deref(),
            payload.title.as_deref(),
            payload.body.as_deref(),
        ],
        &["org_id", "title", "body"],
    )?;
    let published_at = optional_timestamp(payload.published_at.as_deref(), "published_at")?
        .unwrap_or_else(Utc::now);
    let org_id = payload.org_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::PublishContent).await?;

    let devotional = ctx
        .devotionals
        .create(
            &session.org_id,
            &session.user_id,
            NewDevotional {
                title: payload.title.unwrap_or_default(),
                body: payload.body.unwrap_or_default(),
                scripture_reference: payload.scripture_reference.filter(|s| !s.is_empty()),
                published_at,
            },
        )
        .await
        .storage_context("devotionals.insert", "Failed to publish devotional")?;

    Ok(Json(json!({ "status": "ok", "devotional": devotional })))
}
