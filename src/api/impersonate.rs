/// Staff impersonation links and their verification
use super::{org_session, require_fields, JsonBody};
use crate::{
    auth::Credentials,
    context::AppContext,
    error::{SteepleError, SteepleResult},
    policy::Action,
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/functions/impersonate", post(impersonate))
        .route("/auth/verify", get(verify))
}

#[derive(Debug, Deserialize)]
struct ImpersonatePayload {
    org_id: Option<String>,
    target_user_id: Option<String>,
    redirect_to: Option<String>,
}

async fn impersonate(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    WithRejection(Json(payload), _): JsonBody<ImpersonatePayload>,
) -> SteepleResult<Json<Value>> {
    require_fields(
        &[payload.org_id.as_deref(), payload.target_user_id.as_deref()],
        &["org_id", "target_user_id"],
    )?;
    let org_id = payload.org_id.unwrap_or_default();
    let target_user_id = payload.target_user_id.unwrap_or_default();

    let session = org_session(&ctx, &credentials, &org_id, Action::Impersonate).await?;

    let action_link = ctx
        .impersonation
        .issue_link(
            &session,
            &target_user_id,
            payload.redirect_to.filter(|r| !r.is_empty()),
        )
        .await?;

    Ok(Json(json!({ "status": "ok", "action_link": action_link })))
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    token: Option<String>,
}

/// Consume a magic link and hand back an access token for its user
async fn verify(
    State(ctx): State<AppContext>,
    Query(query): Query<VerifyQuery>,
) -> SteepleResult<Json<Value>> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or(SteepleError::MissingFields(vec!["token"]))?;

    let verified = ctx.impersonation.verify(&token).await?;

    let mut body = json!(verified);
    body["status"] = json!("ok");
    Ok(Json(body))
}
