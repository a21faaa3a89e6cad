//! Error taxonomy for the storage core plus the HTTP-facing wrapper.
//!
//! Storage operations return `StorageError`; the façade boundary is where
//! engine-level failures (`sqlx::Error`) are folded into the taxonomy.
//! `AppError` carries the total taxonomy → status mapping for the HTTP
//! layer.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid format for resource ID")]
    InvalidKey,
    #[error("the bucket already exists")]
    DuplicateName,
    #[error("forbidden")]
    Forbidden,
    #[error("write failed: {0}")]
    WriteFailure(#[from] std::io::Error),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound("record"),
            other => StorageError::Sqlx(other),
        }
    }
}

/// Return true if the SQLx error indicates a unique constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// A lightweight wrapper for handler errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
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
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = match &err {
            StorageError::NotFound(_) => StatusCode::NOT_FOUND,
            StorageError::InvalidKey => StatusCode::BAD_REQUEST,
            StorageError::DuplicateName => StatusCode::CONFLICT,
            StorageError::Forbidden => StatusCode::FORBIDDEN,
            StorageError::WriteFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StorageError::Validation(_) => StatusCode::BAD_REQUEST,
            StorageError::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Engine internals are logged here and never leak to the client.
        match &err {
            StorageError::Sqlx(inner) => {
                tracing::error!("storage engine failure: {inner}");
                AppError::internal("internal server error")
            }
            StorageError::WriteFailure(inner) => {
                tracing::error!("stream write failure: {inner}");
                AppError::new(status, "write failed")
            }
            other => AppError::new(status, other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
