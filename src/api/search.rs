/// Full-text search endpoint
use super::org_session;
use crate::{
    auth::Credentials,
    context::AppContext,
    error::{SteepleError, SteepleResult},
    policy::Action,
    search::{SearchPage, SearchQuery},
};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/functions/search", get(search))
}

/// Paging values arrive as strings; anything unparseable falls back to the default
#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    org_id: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

fn parse_number(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

async fn search(
    State(ctx): State<AppContext>,
    credentials: Credentials,
    Query(params): Query<SearchParams>,
) -> SteepleResult<Json<SearchPage>> {
    let query = SearchQuery::new(
        params.q.as_deref().unwrap_or_default(),
        parse_number(params.limit.as_deref()),
        parse_number(params.offset.as_deref()),
    )?;
    let org_id = params
        .org_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SteepleError::invalid("Missing org_id"))?;

    let session = org_session(&ctx, &credentials, &org_id, Action::Search).await?;
    let page = ctx.search.search(&session, &query).await?;

    tracing::debug!(org_id = %session.org_id, total = page.meta.total, "search complete");

    Ok(Json(page))
}
