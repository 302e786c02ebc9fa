use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failures that abort a whole sync.
///
/// `Clone` because a single in-flight sync hands its result to every waiting request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    SourceUnavailable(String),

    #[error("{0}")]
    Parse(String),

    #[error("Failed to encode payload: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Proxy failed: {0}")]
    Proxy(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ProxyErrorResponse {
    error: &'static str,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Sync(e) => {
                match &e {
                    SyncError::Configuration(msg) => tracing::error!("Configuration error: {}", msg),
                    other => tracing::error!("Sync failed: {}", other),
                }
                let body = ErrorResponse {
                    status: "error",
                    message: e.to_string(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
            AppError::Proxy(detail) => {
                tracing::error!("Proxy error: {}", detail);
                let body = ProxyErrorResponse {
                    error: "Proxy failed",
                    detail,
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
