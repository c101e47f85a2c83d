//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] sync_engine::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Device does not belong to the authenticated user: {0}")]
    InvalidDevice(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A referenced conflict id that does not exist in the caller's scope.
    #[error("Conflict not found: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body. `requestId` isn't set here — `into_response` has no
/// access to request extensions — it's spliced in by the `request_timing`
/// middleware once the response leaves the handler.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message, details) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DB_ERROR",
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::Engine(e) => {
                tracing::warn!("Engine error: {:?}", e);
                (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", e.to_string(), None)
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            AppError::InvalidDevice(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_DEVICE",
                msg.clone(),
                None,
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::Conflict(msg) => (StatusCode::NOT_FOUND, "CONFLICT_NOT_FOUND", msg.clone(), None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
                None,
            ),
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Rate limit exceeded, retry after {retry_after_secs}s"),
                None,
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal server error".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: error_message,
                code: code.to_string(),
                timestamp: chrono::Utc::now().timestamp_millis(),
                details,
            }),
        )
            .into_response();

        if let AppError::RateLimited { retry_after_secs } = &self {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
