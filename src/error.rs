/// Unified error types for Steeple
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum SteepleError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Malformed or out-of-range input
    #[error("{0}")]
    InvalidArgument(String),

    /// One or more required request fields were absent
    #[error("Missing required fields")]
    MissingFields(Vec<&'static str>),

    /// Missing or invalid bearer credential
    #[error("{0}")]
    Unauthenticated(String),

    /// Authenticated but not allowed
    #[error("{0}")]
    Forbidden(String),

    /// Referenced entity absent or outside the caller's org
    #[error("{0}")]
    NotFound(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Push gateway call failed
    #[error("{message}")]
    Upstream {
        message: String,
        body: Option<String>,
    },

    /// A required storage step failed; the message is safe to show callers
    #[error("{0}")]
    Storage(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SteepleError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SteepleError::InvalidArgument(message.into())
    }

    /// True for errors caused by the caller rather than by a failed dependency
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SteepleError::InvalidArgument(_)
                | SteepleError::MissingFields(_)
                | SteepleError::Unauthenticated(_)
                | SteepleError::Forbidden(_)
                | SteepleError::NotFound(_)
                | SteepleError::RateLimitExceeded
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SteepleError::InvalidArgument(_) | SteepleError::MissingFields(_) => {
                StatusCode::BAD_REQUEST
            }
            SteepleError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            SteepleError::Forbidden(_) => StatusCode::FORBIDDEN,
            SteepleError::NotFound(_) => StatusCode::NOT_FOUND,
            SteepleError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            SteepleError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            SteepleError::Database(_)
            | SteepleError::Migration(_)
            | SteepleError::Storage(_)
            | SteepleError::Internal(_)
            | SteepleError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> Value {
        match self {
            SteepleError::MissingFields(required) => json!({
                "error": self.to_string(),
                "required": required,
            }),
            SteepleError::Upstream {
                message,
                body: Some(body),
            } => json!({
                "error": message,
                "body": body,
            }),
            // Don't leak details
            SteepleError::Database(_)
            | SteepleError::Migration(_)
            | SteepleError::Internal(_)
            | SteepleError::Io(_) => json!({ "error": "Unexpected error" }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}

/// Convert SteepleError to HTTP response
impl IntoResponse for SteepleError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

impl From<JsonRejection> for SteepleError {
    fn from(rejection: JsonRejection) -> Self {
        SteepleError::InvalidArgument(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<reqwest::Error> for SteepleError {
    fn from(err: reqwest::Error) -> Self {
        SteepleError::Upstream {
            message: format!("Push gateway unreachable: {}", err),
            body: None,
        }
    }
}

/// Result type alias for Steeple operations
pub type SteepleResult<T> = Result<T, SteepleError>;

/// Attach a caller-facing message to a failed storage step.
///
/// Client errors pass through untouched; everything else is logged under
/// `operation` and replaced by [`SteepleError::Storage`].
pub trait StorageContext<T> {
    fn storage_context(self, operation: &'static str, message: &'static str) -> SteepleResult<T>;
}

impl<T> StorageContext<T> for SteepleResult<T> {
    fn storage_context(self, operation: &'static str, message: &'static str) -> SteepleResult<T> {
        self.map_err(|err| {
            if err.is_client_error() {
                return err;
            }
            tracing::error!(operation, error = %err, "storage step failed");
            SteepleError::Storage(message.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            SteepleError::invalid("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SteepleError::Unauthenticated("Unauthorized".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            SteepleError::Forbidden("Membership required".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            SteepleError::NotFound("Report not found".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SteepleError::Upstream {
                message: "Expo push request failed (500)".into(),
                body: None
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_missing_fields_body_lists_fields() {
        let body = SteepleError::MissingFields(vec!["org_id", "report_id"]).body();
        assert_eq!(body["error"], "Missing required fields");
        assert_eq!(body["required"], json!(["org_id", "report_id"]));
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let body = SteepleError::Internal("secret path /var/db".into()).body();
        assert_eq!(body["error"], "Unexpected error");
    }

    #[test]
    fn test_storage_context_passes_client_errors_through() {
        let result: SteepleResult<()> = Err(SteepleError::NotFound("Report not found".into()));
        let err = result
            .storage_context("reports.select", "Failed to load report")
            .unwrap_err();
        assert!(matches!(err, SteepleError::NotFound(_)));

        let result: SteepleResult<()> = Err(SteepleError::Internal("boom".into()));
        let err = result
            .storage_context("reports.select", "Failed to load report")
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to load report");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
