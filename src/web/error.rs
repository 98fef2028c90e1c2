//! Handler-facing error type.

use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors raised while extracting or handling a request.
///
/// Every variant renders as an HTTP response, so handlers can return
/// `Result<Response, WebError>` and use `?` freely.
#[derive(Debug, Error)]
pub enum WebError {
    /// Malformed or missing client input (400).
    #[error("{0}")]
    BadRequest(String),

    /// Any other status with a reason text.
    #[error("{status}: {reason}")]
    Status { status: StatusCode, reason: String },

    /// The body could not be buffered (too large, broken stream).
    #[error(transparent)]
    Body(#[from] BytesRejection),
}

impl WebError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        WebError::BadRequest(reason.into())
    }

    pub fn status(status: StatusCode, reason: impl Into<String>) -> Self {
        WebError::Status {
            status,
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::Status { status, .. } => *status,
            WebError::Body(rejection) => rejection.status(),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
            WebError::Status { status, reason } => (status, reason).into_response(),
            WebError::Body(rejection) => rejection.into_response(),
        }
    }
}
