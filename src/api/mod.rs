/// API routes and handlers
pub mod content;
pub mod events;
pub mod impersonate;
pub mod middleware;
pub mod moderation;
pub mod notifications;
pub mod prayers;
pub mod reminders;
pub mod search;

use crate::{
    auth::Credentials,
    context::AppContext,
    error::{SteepleError, SteepleResult},
    org::OrgSession,
    policy::Action,
};
use axum::{body::Bytes, Json, Router};
use axum_extra::extract::WithRejection;
use serde::de::DeserializeOwned;

/// JSON request body whose rejection renders as a [`SteepleError`]
pub type JsonBody<T> = WithRejection<Json<T>, SteepleError>;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(moderation::routes())
        .merge(reminders::routes())
        .merge(search::routes())
        .merge(notifications::routes())
        .merge(impersonate::routes())
        .merge(events::routes())
        .merge(prayers::routes())
        .merge(content::routes())
}

/// Fail with the full list of required fields if any of them is absent or empty
pub(crate) fn require_fields(
    values: &[Option<&str>],
    names: &'static [&'static str],
) -> SteepleResult<()> {
    if values.iter().any(|v| v.map_or(true, str::is_empty)) {
        return Err(SteepleError::MissingFields(names.to_vec()));
    }
    Ok(())
}

/// Parse a body that may be absent; an empty body means all defaults
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> SteepleResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| SteepleError::invalid(format!("Invalid request body: {}", e)))
}

/// Authenticate the caller and authorize `action` in `org_id`
pub(crate) async fn org_session(
    ctx: &AppContext,
    credentials: &Credentials,
    org_id: &str,
    action: Action,
) -> SteepleResult<OrgSession> {
    let auth = credentials.authenticate(&ctx.config.authentication)?;
    OrgSession::establish(&ctx.memberships, &auth, org_id, action).await
}
