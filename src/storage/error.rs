//! Storage layer error types
//!
//! Defines all errors that can occur while registering, loading,
//! persisting or removing datasets and room reviews.

use thiserror::Error;

/// Errors that can occur in the dataset and review stores
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Dataset id is empty, whitespace-only or contains an underscore
    #[error("Invalid dataset id: {0:?}")]
    InvalidId(String),

    /// Unknown dataset kind
    #[error("Invalid dataset kind: {0}")]
    InvalidKind(String),

    /// A dataset with this id is already registered
    #[error("Dataset already exists: {0}")]
    DatasetExists(String),

    /// Requested dataset does not exist
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Dataset would contain no records
    #[error("Dataset {0} has no valid records")]
    EmptyDataset(String),

    /// A persisted file does not match the id it was stored under
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Room has no review entry
    #[error("No reviews found for room: {0}")]
    ReviewNotFound(String),

    /// Review score outside the accepted range
    #[error("Invalid review score {0}: must be a number between 0 and 5")]
    InvalidScore(f64),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
