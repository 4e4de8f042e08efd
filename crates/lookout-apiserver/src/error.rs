use crate::response::{Envelope, ErrorDetail};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lookout_watcher::WatcherError;
use std::error::Error as _;
use tracing::error;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request or rejected payload (400)
    BadRequest(String),

    /// Resource not found (404)
    NotFound(String),

    /// Duplicate name or illegal transition (409)
    Conflict(String),

    /// Internal server error (500); the detail is kept out of the user message
    Internal(String),
}

/// Result type for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (user_message, internal_message) = match self {
            ApiError::Internal(msg) => {
                error!("Request failed: {}", msg);
                ("internal server error".to_string(), msg)
            }
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) | ApiError::Conflict(msg) => {
                (msg.clone(), msg)
            }
        };

        let body = Envelope::<()>::failed(ErrorDetail {
            code: status.as_u16().to_string(),
            user_message,
            internal_message,
        });

        (status, Json(body)).into_response()
    }
}

impl From<WatcherError> for ApiError {
    fn from(err: WatcherError) -> Self {
        match err {
            WatcherError::Validation { .. } => ApiError::BadRequest(err.to_string()),
            WatcherError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            WatcherError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            WatcherError::StoreFailure { .. } | WatcherError::Executor { .. } => {
                let mut message = err.to_string();
                let mut source = err.source();
                while let Some(cause) = source {
                    message.push_str(": ");
                    message.push_str(&cause.to_string());
                    source = cause.source();
                }
                ApiError::Internal(message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
