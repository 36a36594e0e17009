//! Error types for the relay.
//!
//! Every variant maps to one HTTP status and a `{"error": ...}` body.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

/// Relay errors surfaced to callers.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Inbound payload missing or malformed.
    #[error("{0}")]
    InvalidRequest(String),

    /// Missing or wrong credential, or disallowed origin.
    #[error("{0}")]
    Unauthorized(String),

    /// Upstream call failed (transport, non-2xx, malformed body).
    #[error("upstream error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Upstream {
        /// Upstream HTTP status when one was received.
        status: Option<u16>,
        /// Human-readable summary.
        message: String,
        /// Upstream error body (JSON when it parsed).
        body: Option<Value>,
    },

    /// Assistant run reached a failed terminal state.
    #[error("assistant run ended with status {status}{}", .last_error.as_deref().map(|e| format!(": {e}")).unwrap_or_default())]
    RunFailed {
        /// Terminal run status (`failed`, `cancelled`, `expired`, `incomplete`).
        status: String,
        /// `last_error.message` reported by the run, if any.
        last_error: Option<String>,
    },

    /// Waiting for the run exceeded the poll deadline.
    #[error("assistant run did not finish within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Caller went away; in-flight work was abandoned.
    #[error("request cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Relay task failed outside any upstream call.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    pub(crate) fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Build from a non-2xx upstream response body.
    pub(crate) fn upstream_status(status: u16, text: &str) -> Self {
        let body = serde_json::from_str::<Value>(text)
            .unwrap_or_else(|_| Value::String(text.to_string()));
        Self::Upstream {
            status: Some(status),
            message: format!("upstream returned HTTP {status}"),
            body: Some(body),
        }
    }

    /// HTTP status for this error kind.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::Upstream { .. } | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::RunFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Upstream { .. } => "upstream_error",
            Self::RunFailed { .. } => "run_failed",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// JSON body: upstream error payload passes through, everything else is a string.
    pub fn to_body(&self) -> Value {
        match self {
            Self::Upstream {
                body: Some(body), ..
            } => json!({ "error": body }),
            Self::Upstream { body: None, .. } => json!({ "error": "Unknown error" }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_body_passes_through_as_json() {
        let err = RelayError::upstream_status(429, r#"{"message":"rate limited"}"#);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_body(),
            json!({ "error": { "message": "rate limited" } })
        );
    }

    #[test]
    fn upstream_text_body_is_kept_as_string() {
        let err = RelayError::upstream_status(502, "bad gateway");
        assert_eq!(err.to_body(), json!({ "error": "bad gateway" }));
    }

    #[test]
    fn transport_failure_uses_generic_message() {
        let err = RelayError::upstream("connection refused");
        assert_eq!(err.to_body(), json!({ "error": "Unknown error" }));
    }

    #[test]
    fn run_failed_is_distinct_from_upstream() {
        let err = RelayError::RunFailed {
            status: "expired".to_string(),
            last_error: None,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.kind(), "run_failed");
        assert_eq!(err.to_string(), "assistant run ended with status expired");
    }

    #[test]
    fn timeout_reports_sub_second_limits() {
        let err = RelayError::Timeout(Duration::from_millis(50));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.to_string(), "assistant run did not finish within 50ms");
    }
}
