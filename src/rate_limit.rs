/// Rate Limiting System
use crate::{
    api::middleware::extract_bearer_token,
    auth::is_service_key,
    config::{AuthConfig, RateLimitConfig},
    context::AppContext,
    error::{SteepleError, SteepleResult},
};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Caller class used to pick a quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerTier {
    Service,
    Authenticated,
    Unauthenticated,
}

/// Paths only the scheduler calls
const SERVICE_PATHS: &[&str] = &["/functions/event_reminder", "/functions/push_receipts"];

impl CallerTier {
    /// Only a valid service key on a service path earns the service quota
    fn classify(path: &str, bearer: Option<&str>, auth: &AuthConfig) -> Self {
        match bearer {
            Some(token) if SERVICE_PATHS.contains(&path) && is_service_key(token, auth) => {
                CallerTier::Service
            }
            Some(_) => CallerTier::Authenticated,
            None => CallerTier::Unauthenticated,
        }
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    limit: u32,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
    service: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let auth_quota = Quota::per_second(non_zero(config.authenticated_rps))
            .allow_burst(non_zero(config.burst_size));

        let unauth_quota = Quota::per_second(non_zero(config.unauthenticated_rps))
            .allow_burst(non_zero(config.burst_size / 5));

        let service_quota = Quota::per_second(non_zero(config.service_rps))
            .allow_burst(non_zero(config.burst_size.saturating_mul(2)));

        Self {
            limit: config.authenticated_rps,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
            service: Arc::new(GovernorLimiter::direct(service_quota)),
        }
    }

    pub fn check(&self, tier: CallerTier) -> SteepleResult<()> {
        let limiter = match tier {
            CallerTier::Service => &self.service,
            CallerTier::Authenticated => &self.authenticated,
            CallerTier::Unauthenticated => &self.unauthenticated,
        };

        limiter
            .check()
            .map_err(|_| SteepleError::RateLimitExceeded)
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, SteepleError> {
    if !ctx.config.rate_limit.enabled {
        return Ok(next.run(request).await);
    }

    let bearer = extract_bearer_token(request.headers());
    let tier = CallerTier::classify(
        request.uri().path(),
        bearer.as_deref(),
        &ctx.config.authentication,
    );

    if let Err(e) = ctx.rate_limiter.check(tier) {
        tracing::warn!(?tier, path = %request.uri().path(), "rate limit exceeded");
        return Err(e);
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert("X-RateLimit-Limit", HeaderValue::from(ctx.rate_limiter.limit));

    Ok(response)
}
