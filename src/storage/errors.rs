//! Storage provider error types
//!
//! These errors originate at the relation-set boundary. The scan converts
//! them into `ScanError`s; none of them is retried.

use thiserror::Error;

/// Result type for storage provider operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a relation-set provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("column {column} does not exist in \"{relation}\"")]
    NoSuchColumn { relation: String, column: usize },

    #[error("read failed on \"{object}\": {reason}")]
    ReadFailed { object: String, reason: String },

    #[error("invalid table description: {0}")]
    InvalidTable(String),
}

impl StorageError {
    /// Create a read failure for the named storage object
    pub fn read_failed(object: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::ReadFailed {
            object: object.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid table description error
    pub fn invalid_table(reason: impl Into<String>) -> Self {
        StorageError::InvalidTable(reason.into())
    }
}
