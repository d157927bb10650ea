//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input rejected before any folding or writing happens
    #[error("Validation error: {0}")]
    Validation(String),

    /// An expense references a user that is not part of the project
    #[error("Inconsistent ledger: {0}")]
    InputInconsistency(String),

    /// A settlement transfer names a user that cannot be resolved
    #[error("Cannot resolve user: {0}")]
    Resolution(String),

    /// The ledger store rejected or failed a write
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an input inconsistency error
    pub fn inconsistency(msg: impl Into<String>) -> Self {
        Self::InputInconsistency(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// True for failures of the store itself (as opposed to bad input)
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Database(_) | Self::Io(_))
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_are_classified() {
        assert!(Error::persistence("disk full").is_storage());
        assert!(Error::database("locked").is_storage());
        assert!(!Error::validation("bad").is_storage());
        assert!(!Error::inconsistency("dangling").is_storage());
    }
}
