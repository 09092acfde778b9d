//! Error types for maturity-store

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaturityError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Missing dimension: {0}")]
    MissingDimension(String),

    #[error("Invalid value in column {column}: {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Read-only violation: {0}")]
    ReadOnlyViolation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Import rejected: {} violation(s): {}", .0.len(), .0.join("; "))]
    ImportRejected(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used in import reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Schema,
    InsufficientData,
    MissingDimension,
    InvalidValue,
    ConstraintViolation,
    NotFound,
    ReadOnlyViolation,
    InvalidInput,
    ImportRejected,
    Config,
    Io,
    Json,
    Database,
    Internal,
}

impl MaturityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_) => ErrorKind::Schema,
            Self::InsufficientData(_) => ErrorKind::InsufficientData,
            Self::MissingDimension(_) => ErrorKind::MissingDimension,
            Self::InvalidValue { .. } => ErrorKind::InvalidValue,
            Self::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ReadOnlyViolation(_) => ErrorKind::ReadOnlyViolation,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ImportRejected(_) => ErrorKind::ImportRejected,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Json,
            Self::Database(_) => ErrorKind::Database,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Map a rusqlite write failure, surfacing UNIQUE/FOREIGN KEY failures as
    /// constraint violations.
    pub fn from_write(context: &str, err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, ref msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(format!(
                    "{}: {}",
                    context,
                    msg.clone().unwrap_or_else(|| code.to_string())
                ))
            }
            other => Self::Database(other),
        }
    }
}
