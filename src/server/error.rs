use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::Error;

/// Handler error rendered as `{"status": "Failed", "message": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body was not the expected JSON shape.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The body was JSON but not an object with a numeric `limit`.
    #[error("missing or non-numeric limit")]
    MissingLimit,

    #[error(transparent)]
    Core(#[from] Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidBody(_)
            | ApiError::MissingLimit
            | ApiError::Core(Error::InvalidLimit(_)) => {
                tracing::debug!(error = %self, "Rejected request");
                (StatusCode::BAD_REQUEST, "Invalid data")
            }
            ApiError::Core(Error::ShutdownFailed(_)) => {
                tracing::error!(error = %self, "Manual shutdown failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Shutdown failed")
            }
            _ => {
                tracing::error!(error = %self, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };

        let body = json!({
            "status": "Failed",
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
