//! Error types for leadflow.

use thiserror::Error;

/// Result type alias using leadflow's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for leadflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lead not found (or outside the caller's tenant)
    #[error("Lead not found: {0}")]
    LeadNotFound(uuid::Uuid),

    /// Duplicate group not found (or outside the caller's tenant)
    #[error("Duplicate group not found: {0}")]
    GroupNotFound(uuid::Uuid),

    /// Concurrent merge, already-merged source, or resolved group
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transient persistence failure outside sqlx (store collaborators)
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Whether this error is a conflict (caller may retry with fresh state).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Whether this error came from the persistence layer and is believed
    /// transient. Detection paths treat these as "no match".
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Store(_))
    }
}
