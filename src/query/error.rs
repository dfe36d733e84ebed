//! Query error types
//!
//! Defines all error conditions that can occur during query validation and execution.
//! Every query ends in exactly one outcome: rows, or one of these errors.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed query tree, detected before any record is read
    #[error("Invalid query: {0}")]
    Validation(String),

    /// Referenced dataset does not exist
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Filtered or grouped row count exceeds the cap
    #[error("Result too large: {rows} rows exceeds the limit of {limit}")]
    ResultTooLarge { rows: usize, limit: usize },

    /// A validated query hit a condition validation should have ruled out
    #[error("Internal error: {0}")]
    Internal(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

impl QueryError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        QueryError::Validation(msg.into())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
