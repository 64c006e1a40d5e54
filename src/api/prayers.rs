/// Prayer wall endpoints
use super::{org_session, require_fields, JsonBody};
use crate::{
    auth::Credentials,
    content::{NewPrayer, Prayer, PrayerDetail},
    context::AppContext,
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
use serde::Deserialize;
use serde_json::{json, Value};

const MAX_BODY_CHARS: usize = 2000;
const MAX_EMOJI_CHARS: usize = 16;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/prayers", get(list_prayers).post(post_prayer))
        .route("/prayers/:id", get(prayer_detail))
        .route("/prayers/:id/reactions", post(toggle_reaction))
}

#[derive(Debug, Deserialize)]
struct OrgQuery {
    org_id: Option<String>,
}

async fn list_prayers(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Query(query): Query<OrgQuery>,
) -> SteepleResult<Json<Value>> {
    require_fields(&[query.org_id.as_deref()], &["org_id"])?;
    let org_id = query.org_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::ViewContent).await?;

    let prayers = ctx
        .prayers
        .list_visible(&session.org_id)
        .await
        .storage_context("prayers.select", "Failed to load prayers")?;

    Ok(Json(json!({ "prayers": prayers })))
}

#[derive(Debug, Deserialize)]
struct PostPrayerPayload {
    org_id: Option<String>,
    body: Option<String>,
    #[serde(default)]
    is_anonymous: bool,
}

async fn post_prayer(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    WithRejection(Json(payload), _): JsonBody<PostPrayerPayload>,
) -> SteepleResult<Json<Value>> {
    let body = payload.body.as_deref().map(str::trim).unwrap_or_default().to_string();
    require_fields(&[payload.org_id.as_deref(), Some(body.as_str())], &["org_id", "body"])?;
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(SteepleError::invalid(format!(
            "Prayer must be at most {} characters",
            MAX_BODY_CHARS
        )));
    }
    let org_id = payload.org_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::PostPrayer).await?;

    let prayer = ctx
        .prayers
        .create(
            &session.org_id,
            &session.user_id,
            NewPrayer {
                body,
                is_anonymous: payload.is_anonymous,
            },
        )
        .await
        .storage_context("prayers.insert", "Failed to post prayer")?;

    tracing::debug!(prayer_id = %prayer.id, org_id = %prayer.org_id, anonymous = prayer.is_anonymous, "prayer posted");

    Ok(Json(json!({ "status": "ok", "prayer": prayer })))
}

/// Load a visible prayer and authorize `action` in its org
async fn visible_prayer(
    ctx: &AppContext,
    credentials: &Credentials,
    prayer_id: &str,
    action: Action,
) -> SteepleResult<(Prayer, OrgSession)> {
    let auth = credentials.authenticate(&ctx.config.authentication)?;

    let prayer = ctx
        .prayers
        .get(prayer_id)
        .await
        .storage_context("prayers.select", "Failed to load prayer")?
        .filter(|p| p.hidden_at.is_none())
        .ok_or_else(|| SteepleError::NotFound("Prayer not found".to_string()))?;

    let session = OrgSession::establish(&ctx.memberships, &auth, &prayer.org_id, action).await?;
    Ok((prayer, session))
}

async fn prayer_detail(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Path(prayer_id): Path<String>,
) -> SteepleResult<Json<PrayerDetail>> {
    let (prayer, _session) = visible_prayer(&ctx, &credentials, &prayer_id, Action::ViewContent).await?;

    let reactions = ctx
        .prayers
        .reactions(&prayer.id)
        .await
        .storage_context("prayer_reactions.select", "Failed to load reactions")?;

    Ok(Json(PrayerDetail { prayer, reactions }))
}

#[derive(Debug, Deserialize)]
struct ReactionPayload {
    emoji: Option<String>,
}

/// Add, switch or remove the caller's reaction
async fn toggle_reaction(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Path(prayer_id): Path<String>,
    WithRejection(Json(payload), _): JsonBody<ReactionPayload>,
) -> SteepleResult<Json<Value>> {
    require_fields(&[payload.emoji.as_deref()], &["emoji"])?;
    let emoji = payload.emoji.unwrap_or_default();
    if emoji.chars().count() > MAX_EMOJI_CHARS {
        return Err(SteepleError::invalid("Invalid emoji"));
    }

    let (prayer, session) =
        visible_prayer(&ctx, &credentials, &prayer_id, Action::ReactToPrayer).await?;

    let reactions = ctx
        .prayers
        .toggle_reaction(&prayer.id, &session.user_id, &emoji)
        .await
        .storage_context("prayer_reactions.upsert", "Failed to save reaction")?;

    Ok(Json(json!({ "status": "ok", "reactions": reactions })))
}
