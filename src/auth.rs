/// Authentication extractors and utilities
use crate::{
    api::middleware::extract_bearer_token,
    config::AuthConfig,
    context::AppContext,
    error::{SteepleError, SteepleResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// Claims carried by member access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub role: Option<String>,
    /// Set on tokens minted from an impersonation link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonated_by: Option<String>,
}

/// Authenticated caller identity
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub claims: Claims,
}

/// Raw bearer credential from the request.
///
/// Extraction never fails, so handlers can validate their input before
/// deciding whether the caller is authenticated.
#[derive(Debug, Clone)]
pub struct Credentials {
    token: Option<String>,
}

impl Credentials {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// Resolve the bearer token to a caller identity
    pub fn authenticate(&self, config: &AuthConfig) -> SteepleResult<AuthContext> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| SteepleError::Unauthenticated("Missing bearer token".to_string()))?;

        let claims = verify_jwt_token(token, &config.jwt_secret)
            .map_err(|_| SteepleError::Unauthenticated("Unauthorized".to_string()))?;

        if claims.sub.is_empty() {
            return Err(SteepleError::Unauthenticated("Unauthorized".to_string()));
        }

        Ok(AuthContext {
            user_id: claims.sub.clone(),
            claims,
        })
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Credentials {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Credentials::new(extract_bearer_token(&parts.headers)))
    }
}

/// Service caller (scheduler, cron, operators) holding the service role key
#[derive(Debug, Clone)]
pub struct ServiceAuth;

#[async_trait]
impl FromRequestParts<AppContext> for ServiceAuth {
    type Rejection = SteepleError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| SteepleError::Unauthenticated("Missing bearer token".to_string()))?;

        if !is_service_key(&token, &state.config.authentication) {
            tracing::warn!("ServiceAuth: rejected service key");
            return Err(SteepleError::Unauthenticated("Unauthorized".to_string()));
        }

        Ok(ServiceAuth)
    }
}

/// Whether `token` is the configured service role key
pub fn is_service_key(token: &str, config: &AuthConfig) -> bool {
    constant_time_eq(token.as_bytes(), config.service_role_key.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verify a JWT token with full validation
///
/// This performs:
/// 1. JWT signature verification
/// 2. Expiration checking
/// 3. Claims decoding
pub fn verify_jwt_token(token: &str, jwt_secret: &str) -> SteepleResult<Claims> {
    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (1 minute)
    validation.leeway = 60;
    validation.validate_aud = false;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("JWT verification failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    SteepleError::Unauthenticated("Token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    SteepleError::Unauthenticated("Invalid token signature".to_string())
                }
                _ => SteepleError::Unauthenticated(format!("Invalid token: {}", e)),
            }
        })
}

/// Mint an HS256 access token for a user
pub fn issue_access_token(
    user_id: &str,
    config: &AuthConfig,
    impersonated_by: Option<&str>,
) -> SteepleResult<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + config.access_token_ttl_secs,
        role: Some("authenticated".to_string()),
        impersonated_by: impersonated_by.map(String::from),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| SteepleError::Internal(format!("Failed to sign access token: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_issued_token_authenticates() {
        let config = ServerConfig::development().authentication;
        let token = issue_access_token("user-42", &config, None).unwrap();

        let auth = Credentials::new(Some(token)).authenticate(&config).unwrap();
        assert_eq!(auth.user_id, "user-42");
        assert_eq!(auth.claims.role.as_deref(), Some("authenticated"));
        assert!(auth.claims.impersonated_by.is_none());
    }

    #[test]
    fn test_missing_and_forged_tokens_are_unauthenticated() {
        let config = ServerConfig::development().authentication;

        let err = Credentials::new(None).authenticate(&config).unwrap_err();
        assert_eq!(err.to_string(), "Missing bearer token");

        let mut other = config.clone();
        other.jwt_secret = "another-secret-that-is-long-enough-to-pass".to_string();
        let forged = issue_access_token("user-42", &other, None).unwrap();
        let err = Credentials::new(Some(forged))
            .authenticate(&config)
            .unwrap_err();
        assert!(matches!(err, SteepleError::Unauthenticated(_)));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"service-key", b"service-key"));
        assert!(!constant_time_eq(b"service-key", b"service-kez"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
