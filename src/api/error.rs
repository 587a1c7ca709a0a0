//! HTTP error mapping.

use crate::error::FlipbookError;
use axum::extract::multipart::MultipartError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error codes returned in the `code` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    MissingField,
    InvalidPdf,
    PayloadTooLarge,
    NotFound,
    ServiceUnavailable,
    InternalError,
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Required field missing: {0}")]
    MissingField(&'static str),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Flipbook(#[from] FlipbookError),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::MissingField(_) => ErrorCode::MissingField,
            ApiError::BadRequest(_) => ErrorCode::ValidationError,
            ApiError::PayloadTooLarge(_) => ErrorCode::PayloadTooLarge,
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::Flipbook(e) => match e {
                FlipbookError::FileTooLarge { .. } => ErrorCode::PayloadTooLarge,
                FlipbookError::EmptyUpload => ErrorCode::MissingField,
                FlipbookError::NotAPdf { .. } | FlipbookError::EmptyDocument => {
                    ErrorCode::InvalidPdf
                }
                FlipbookError::StorageUnavailable(_) => ErrorCode::ServiceUnavailable,
                FlipbookError::Internal(_) => ErrorCode::InternalError,
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.code() {
            ErrorCode::ValidationError | ErrorCode::MissingField | ErrorCode::InvalidPdf => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        // The body limit surfaces here as a 413 from the multipart reader.
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(format!("Upload too large: {}", e.body_text()))
        } else {
            ApiError::BadRequest(e.body_text())
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, code = ?code, status = status.as_u16(), "Server error");
        } else {
            tracing::warn!(error = %message, code = ?code, status = status.as_u16(), "Client error");
        }

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}
