// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Every public comment/vote operation returns one of these instead of a bare null,
/// so callers can tell a missing record apart from a broken store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // 500 Internal Server Error. The cause is logged, never sent to the client.
    StoreFailure(String),

    // 400 Bad Request
    Validation(String),

    // 401 Unauthorized
    Unauthenticated(String),

    // 404 Not Found
    NotFound(String),
}

impl AppError {
    /// Short machine-readable name of the failure kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::StoreFailure(_) => "store_failure",
            AppError::Validation(_) => "validation",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::NotFound(_) => "not_found",
        }
    }

    /// Logs the error at the boundary of operation `op`.
    /// Store failures are errors; everything else is caller input and only warned about.
    pub fn log_at(&self, op: &str) {
        match self {
            AppError::StoreFailure(msg) => {
                tracing::error!(op, kind = self.kind(), "Failed {}: {}", op, msg)
            }
            other => tracing::warn!(op, kind = other.kind(), "Rejected {}: {}", op, other),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::StoreFailure(msg) => write!(f, "store failure: {}", msg),
            AppError::Validation(msg) => write!(f, "validation error: {}", msg),
            AppError::Unauthenticated(msg) => write!(f, "unauthenticated: {}", msg),
            AppError::NotFound(msg) => write!(f, "not found: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::StoreFailure(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::StoreFailure`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::StoreFailure(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
