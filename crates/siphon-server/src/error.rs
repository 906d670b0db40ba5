use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use siphon_core::CoreError;
use siphon_net::NetError;
use siphon_store::StoreError;
use thiserror::Error;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Application-level error type mapping domain errors to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing ref, blob, snapshot entry, or model directory (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request from the client (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The upstream hub is unreachable or failed (503).
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// Cache filesystem failure or malformed persisted state (500).
    /// Message is logged but not returned to the client.
    #[error("internal error: {0}")]
    Internal(String),

    /// Selected storage backend does not implement the operation (501).
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Upstream(_) => (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::NotImplemented(_) => (StatusCode::NOT_IMPLEMENTED, "NOT_IMPLEMENTED"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Internal details stay in the logs, not the response.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::Upstream(_) => tracing::warn!(error = %self, "upstream unavailable"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            return Self::NotFound(err.to_string());
        }
        match err {
            StoreError::Unimplemented(what) => Self::NotImplemented(what.to_string()),
            StoreError::InvalidPath(msg) => Self::BadRequest(msg),
            StoreError::Core(e) => Self::BadRequest(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<NetError> for AppError {
    fn from(err: NetError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::NotFound("x".into()).status_and_code().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Upstream("x".into()).status_and_code().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal("x".into()).status_and_code().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::BadRequest("x".into()).status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotImplemented("x".into()).status_and_code().0,
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn store_not_found_maps_to_404() {
        let err = AppError::from(StoreError::ModelNotFound("acme/foo".into()));
        assert_eq!(err.status_and_code().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn malformed_index_maps_to_500() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = AppError::from(StoreError::Json(json_err));
        assert_eq!(err.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unimplemented_maps_to_501() {
        let err = AppError::from(StoreError::Unimplemented("vcs-backed storage"));
        assert_eq!(err.status_and_code().0, StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn net_error_maps_to_503() {
        let err = AppError::from(NetError::Timeout);
        assert_eq!(err.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);
    }
}
