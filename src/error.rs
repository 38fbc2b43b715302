use axum::{http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SourceId;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Stored record could not be decoded: {0}")]
    Decode(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Failure of a single network call made on behalf of a source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeout, connection failure or 5xx. Retried with backoff.
    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    /// 403 or an anti-bot interstitial. Retried with backoff and identity rotation.
    #[error("blocked by {url} (status {status})")]
    Blocked { url: String, status: u16 },

    /// 429. Retried with backoff and identity rotation.
    #[error("rate limited by {url}")]
    RateLimited { url: String },

    /// Any other non-success status (404, 410, ...). Not retried.
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The path is excluded by the source's crawl policy. Never retried.
    #[error("crawl policy of {source_id} disallows {path}")]
    PolicyViolation { source_id: SourceId, path: String },

    #[error("crawl cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transient { .. } | FetchError::Blocked { .. } | FetchError::RateLimited { .. }
        )
    }
}

/// Why a raw capture could not be promoted to a validated listing.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("required field `{field}` is missing")]
    MissingField { field: String },

    #[error("field `{field}` has unparseable value {value:?}")]
    UnparseableValue { field: String, value: String },
}

impl ValidationError {
    pub fn missing(field: &str) -> Self {
        ValidationError::MissingField { field: field.to_string() }
    }

    pub fn unparseable(field: &str, value: &str) -> Self {
        ValidationError::UnparseableValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MissingField { .. } => "missing_field",
            ValidationError::UnparseableValue { .. } => "unparseable_value",
        }
    }

    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingField { field } => field,
            ValidationError::UnparseableValue { field, .. } => field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_blocked_and_rate_limited_are_retryable() {
        assert!(FetchError::Transient { url: "u".into(), reason: "timeout".into() }.is_retryable());
        assert!(FetchError::Blocked { url: "u".into(), status: 403 }.is_retryable());
        assert!(FetchError::RateLimited { url: "u".into() }.is_retryable());
        assert!(!FetchError::Status { url: "u".into(), status: 404 }.is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
        assert!(!FetchError::PolicyViolation {
            source_id: SourceId::VivaReal,
            path: "/admin".into()
        }
        .is_retryable());
    }

    #[test]
    fn validation_error_serializes_with_kind_tag() {
        let err = ValidationError::unparseable("price", "R$ 1.2.3");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "unparseable_value");
        assert_eq!(json["field"], "price");
        assert_eq!(err.field(), "price");
    }
}
