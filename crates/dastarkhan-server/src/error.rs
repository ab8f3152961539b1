use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dastarkhan_storage::{ErrorCategory, StorageError};
use serde_json::json;

/// Errors returned by route handlers.
///
/// Only source store failures reach this point; cache failures are absorbed
/// inside the repositories.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not-found",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "exception",
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err.category() {
            ErrorCategory::NotFound => ApiError::NotFound(err.to_string()),
            ErrorCategory::Infrastructure => {
                tracing::warn!(error = %err, "source store unavailable");
                ApiError::Unavailable(err.to_string())
            }
            _ => {
                tracing::error!(error = %err, category = %err.category(), "source store failure");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}
