use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;
use crate::security::TokenError;
use crate::services::uploads::UploadError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Authentication error: {0}")]
    Unauthenticated(String),

    #[error("Authorization error: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Operation timed out")]
    Timeout,

    #[error("Storage error")]
    Storage(String),

    #[error("Internal server error")]
    Internal(String),
}

/// Uniform error envelope
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::RateLimited => "RATE_LIMIT_EXCEEDED",
            AppError::Unauthenticated(_) => "AUTHENTICATION_ERROR",
            AppError::Forbidden(_) => "AUTHORIZATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Upload(_) => "UPLOAD_ERROR",
            AppError::Timeout => "TIMEOUT",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-safe detail; backend error text is logged instead
    fn detail(&self) -> Option<String> {
        match self {
            AppError::Validation(msg) => Some(msg.clone()),
            AppError::Upload(e) if e.is_client_error() => Some(e.to_string()),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Validation(_) => "Invalid request".to_string(),
            AppError::RateLimited => "Rate limit exceeded, please try again later".to_string(),
            AppError::Unauthenticated(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::Upload(e) if e.is_client_error() => "Invalid avatar".to_string(),
            AppError::Upload(_) => "Avatar upload failed".to_string(),
            AppError::Timeout => "The request took too long to complete".to_string(),
            AppError::Storage(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.code().to_string(),
            message: self.message(),
            status: self.status_code().as_u16(),
            detail: self.detail(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upload(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            AppError::Upload(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Storage(e) => tracing::error!(error = %e, "Storage failure"),
            AppError::Internal(e) => tracing::error!(error = %e, "Internal failure"),
            AppError::Upload(e) if !e.is_client_error() => {
                tracing::warn!(error = %e, "Upload failure")
            }
            _ => {}
        }

        HttpResponse::build(self.status_code()).json(self.to_response_body())
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => AppError::NotFound("User not found".to_string()),
            StoreError::Conflict(field) => AppError::Conflict(format!("{} already in use", field)),
            StoreError::Backend(e) => AppError::Storage(e),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Signing(e) => AppError::Internal(format!("token signing failed: {}", e)),
            other => {
                tracing::debug!("Token rejected: {}", other);
                AppError::Unauthenticated("Invalid or expired token".to_string())
            }
        }
    }
}

impl From<resilience::Elapsed> for AppError {
    fn from(_: resilience::Elapsed) -> Self {
        AppError::Timeout
    }
}

// Convert validator errors to AppError
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}
