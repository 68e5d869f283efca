//! HTTP error responses

use agrosmart_protocol::ErrorBody;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::errors::StationError;

/// Handler error with a stable `error` code for clients.
///
/// Anything that is not the caller's fault becomes a 500 whose body carries a
/// fixed message; the cause is only logged.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid next_token")]
    InvalidNextToken,

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidNextToken => StatusCode::BAD_REQUEST,
            ApiError::PublishFailed(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::InvalidNextToken => "invalid_next_token",
            ApiError::PublishFailed(_) => "publish_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

/// Validation errors are the caller's; everything else is sanitized
impl From<StationError> for ApiError {
    fn from(err: StationError) -> Self {
        match err {
            StationError::InvalidCursor => ApiError::InvalidNextToken,
            StationError::ValidationError(msg) => ApiError::BadRequest(msg),
            StationError::TransportError(msg) => ApiError::PublishFailed(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::InvalidNextToken => self.to_string(),
            ApiError::PublishFailed(msg) => {
                error!(error = %msg, "Command publish failed");
                "The command could not be handed to the broker".to_string()
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                "An internal error occurred".to_string()
            }
        };

        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}
