/// Device registration and notification preference endpoints
use super::{org_session, require_fields, JsonBody};
use crate::{
    auth::Credentials,
    context::AppContext,
    db::parse_timestamp,
    error::{StorageContext, SteepleError, SteepleResult},
    notifications::{Platform, PreferencesPatch},
    policy::Action,
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/functions/save_device_token", post(save_device_token))
        .route(
            "/functions/notification_prefs",
            get(get_preferences)
                .post(save_preferences)
                .put(save_preferences),
        )
}

#[derive(Debug, Deserialize)]
struct DeviceTokenPayload {
    org_id: Option<String>,
    token: Option<String>,
    platform: Option<String>,
    last_seen_at: Option<String>,
}

async fn save_device_token(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    WithRejection(Json(payload), _): JsonBody<DeviceTokenPayload>,
) -> SteepleResult<Json<Value>> {
    require_fields(
        &[
            payload.org_id.as_deref(),
            payload.token.as_deref(),
            payload.platform.as_deref(),
        ],
        &["org_id", "token", "platform"],
    )?;
    let platform: Platform = payload.platform.as_deref().unwrap_or_default().parse()?;
    let last_seen_at = match payload.last_seen_at.as_deref() {
        Some(raw) => parse_timestamp(raw)
            .map_err(|_| SteepleError::invalid("Invalid last_seen_at timestamp"))?,
        None => Utc::now(),
    };
    let org_id = payload.org_id.unwrap_or_default();
    let token = payload.token.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::RegisterDevice).await?;

    ctx.devices
        .upsert(&session.org_id, &session.user_id, &token, platform, last_seen_at)
        .await
        .storage_context("device_tokens.upsert", "Failed to save device token")?;

    tracing::debug!(org_id = %session.org_id, user_id = %session.user_id, platform = platform.as_str(), "device token saved");

    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
struct PreferencesPayload {
    org_id: Option<String>,
    #[serde(flatten)]
    patch: PreferencesPatch,
}

async fn save_preferences(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    WithRejection(Json(payload), _): JsonBody<PreferencesPayload>,
) -> SteepleResult<Json<Value>> {
    let org_id = payload
        .org_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SteepleError::invalid("Missing org_id"))?;

    let session = org_session(&ctx, &credentials, &org_id, Action::UpdatePreferences).await?;

    let preferences = ctx
        .preferences
        .upsert(&session.org_id, &session.user_id, payload.patch)
        .await
        .storage_context("notification_preferences.upsert", "Failed to save preferences")?;

    Ok(Json(json!({ "status": "ok", "preferences": preferences })))
}

#[derive(Debug, Deserialize)]
struct PreferencesQuery {
    org_id: Option<String>,
}

async fn get_preferences(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Query(query): Query<PreferencesQuery>,
) -> SteepleResult<Json<Value>> {
    let org_id = query
        .org_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SteepleError::invalid("Missing org_id"))?;

    let session = org_session(&ctx, &credentials, &org_id, Action::UpdatePreferences).await?;

    let preferences = ctx
        .preferences
        .effective(&session.org_id, &session.user_id)
        .await
        .storage_context("notification_preferences.select", "Failed to load preferences")?;

    Ok(Json(json!({ "status": "ok", "preferences": preferences })))
}
