use crate::services::{blob_store::BlobError, catalog_service::CatalogError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;

/// A lightweight wrapper for errors that reach the HTTP boundary.
///
/// `message` is what the caller sees; internal detail is logged where the
/// error is classified and never copied into it.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Value>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "status": self.status.as_u16()
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(fields) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "One or more fields are invalid.",
            )
            .with_details(json!(fields)),
            CatalogError::NotFound(_) => Self::not_found("Movie not found."),
            CatalogError::ConcurrencyConflict(_) => Self::new(
                StatusCode::CONFLICT,
                "The movie was changed by someone else. Reload it and try again.",
            ),
            CatalogError::UploadFailure(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "The image could not be uploaded. Please try again.",
            ),
            CatalogError::DeleteFailure(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "The image could not be removed. No changes were saved.",
            ),
            CatalogError::InvalidReference(_) | CatalogError::Persistence(_) => {
                Self::internal("Unable to save changes. Please try again later.")
            }
        }
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(_) | BlobError::InvalidReference(_) => {
                Self::not_found("File not found.")
            }
            other => {
                tracing::error!(error = %other, "blob read failed");
                Self::internal("Unable to read file.")
            }
        }
    }
}
