//! Subscription Controller error types.
//!
//! Domain outcomes (unauthorized, rate limited, resource ended, not found)
//! are not errors: they are encoded in the structured results returned by
//! the lifecycle and revalidation paths. `ScError` covers what is left:
//! a request without a caller identity, and malformed requests on the HTTP
//! surface.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.

use crate::observability::metrics;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Subscription Controller error type.
///
/// Maps to HTTP status codes:
/// - Unauthenticated: 401 Unauthorized
/// - BadRequest: 400 Bad Request
#[derive(Debug, Error)]
pub enum ScError {
    /// No caller identity in the request context.
    #[error("Caller identity missing")]
    Unauthenticated,

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ScError {
    /// Returns the HTTP status code for this error (for metrics recording).
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            ScError::Unauthenticated => 401,
            ScError::BadRequest(_) => 400,
        }
    }

    /// Returns a bounded label for the `error_type` metric dimension.
    #[must_use]
    pub fn error_type_label(&self) -> &'static str {
        match self {
            ScError::Unauthenticated => "unauthenticated",
            ScError::BadRequest(_) => "bad_request",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ScError {
    fn into_response(self) -> Response {
        metrics::record_error(self.error_type_label(), self.status_code());

        let (status, code, message) = match &self {
            ScError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Caller identity required".to_string(),
            ),
            ScError::BadRequest(reason) => {
                tracing::debug!(target: "sc.handlers", reason = %reason, "Rejected malformed request");
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
