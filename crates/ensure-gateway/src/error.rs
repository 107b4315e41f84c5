//! API error types and responses.
//!
//! This module defines the standard error format for all API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use ensure_engine::EngineError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request body, target or configuration.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The hub failed a request made on the caller's behalf.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Upstream(_) => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err.http_status_code() {
            400 => Self::BadRequest(err.to_string()),
            502 => {
                tracing::error!(error = %err, retriable = err.is_retriable(), "Hub error");
                Self::Upstream(err.to_string())
            }
            status => {
                tracing::error!(error = %err, status, "Unmapped engine error");
                Self::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::BadRequest("test".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Upstream("test".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Internal("test".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn engine_errors_map_to_api_errors() {
        let err = ApiError::from(EngineError::NoEntities);
        assert_eq!(err.code(), "bad_request");
        assert_eq!(err.to_string(), "bad request: no entities specified");

        let err = ApiError::from(EngineError::Platform("hub down".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = ApiError::from(EngineError::InvalidConfig {
            field: "max_retries",
            reason: "0 is outside 1..=10".into(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn api_status_tracks_engine_status() {
        for err in [
            EngineError::NoEntities,
            EngineError::Platform("timeout".into()),
        ] {
            let expected = err.http_status_code();
            assert_eq!(ApiError::from(err).status_code().as_u16(), expected);
        }
    }
}
