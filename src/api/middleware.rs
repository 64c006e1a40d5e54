/// Request middleware and header helpers
use crate::metrics;
use axum::{
    extract::{MatchedPath, Request},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Extract bearer token from Authorization header
///
/// The scheme is matched case-insensitively; an empty token counts as absent.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

/// Count and time every request by its route template
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    metrics::HTTP_REQUESTS_ACTIVE.inc();
    let response = next.run(request).await;
    metrics::HTTP_REQUESTS_ACTIVE.dec();

    metrics::record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
