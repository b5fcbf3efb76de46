//! HTTP-facing error type for the relay handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Webhook handshake failed (wrong mode or verify token).
    #[error("Forbidden")]
    Forbidden,

    /// Notification for an object type other than `page`.
    #[error("Not found")]
    NotFound,

    /// Request is missing required fields.
    #[error("{0}")]
    Validation(String),

    /// No access token configured for the page.
    #[error("Token for page {0} not configured.")]
    PageNotConfigured(String),

    /// The Graph API call failed.
    #[error("{0}")]
    Upstream(String),
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            // The platform only looks at the status for these two.
            Self::Forbidden => return StatusCode::FORBIDDEN.into_response(),
            Self::NotFound => return StatusCode::NOT_FOUND.into_response(),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::PageNotConfigured(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PAGE_NOT_CONFIGURED")
            }
            Self::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type for relay handlers.
pub type RelayResult<T> = Result<T, RelayError>;
