//! Error taxonomy shared by the lifecycle logic and the HTTP layer.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Failure kinds surfaced to the caller. Every variant carries a reason
/// specific to the condition that triggered it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable machine-readable code for API responses.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::Infrastructure(_) => "INFRASTRUCTURE_ERROR",
        }
    }

    /// The human-readable reason without the kind prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::Validation(msg)
            | Self::Unauthorized(msg)
            | Self::NotFound(msg)
            | Self::Forbidden(msg)
            | Self::Conflict(msg)
            | Self::Infrastructure(msg) => msg,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Store internals stay in the server log.
        let message = match self {
            Self::Infrastructure(detail) => {
                error!("Request failed: {}", detail);
                "Internal server error"
            }
            other => other.reason(),
        };
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "code": self.code(),
            "message": message,
        }))
    }
}
