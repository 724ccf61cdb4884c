//! # AppError
//!
//! Centralized error handling for the time capsule service.
//! Ports report failures through `anyhow`; the service layer sorts them
//! into the variants below so the API can pick a status code.

use thiserror::Error;

/// The primary error type for all capsule operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Capsule, File)
    #[error("{kind} not found with ID {id}")]
    NotFound { kind: &'static str, id: String },

    /// Bad or missing input (e.g., malformed unlock date, blank title)
    #[error("validation error: {0}")]
    Validation(String),

    /// Admin-only operation attempted without valid credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Content requested before the capsule was unlocked
    #[error("locked: {0}")]
    Locked(String),

    /// Upload write/read failure in a `FileStore`
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    /// Connection or query failure in a `CapsuleRepo`
    #[error("database error: {0:#}")]
    Database(anyhow::Error),
}

impl AppError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for failures the caller caused (4xx), false for infrastructure faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Database(_))
    }
}

/// A specialized Result type for capsule logic.
pub type Result<T> = std::result::Result<T, AppError>;
