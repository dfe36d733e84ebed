//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::query::QueryError;
use crate::storage::StorageError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Query validation or execution error
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// HTTP status and machine-readable code
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Query(e) => match e {
                QueryError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_QUERY"),
                QueryError::ResultTooLarge { .. } => (StatusCode::BAD_REQUEST, "RESULT_TOO_LARGE"),
                QueryError::DatasetNotFound(_) => (StatusCode::NOT_FOUND, "DATASET_NOT_FOUND"),
                QueryError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
                QueryError::Storage(e) => storage_status(e),
            },
            ApiError::Storage(e) => storage_status(e),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

fn storage_status(e: &StorageError) -> (StatusCode, &'static str) {
    match e {
        StorageError::InvalidId(_) => (StatusCode::BAD_REQUEST, "INVALID_DATASET_ID"),
        StorageError::InvalidKind(_) => (StatusCode::BAD_REQUEST, "INVALID_DATASET_KIND"),
        StorageError::DatasetExists(_) => (StatusCode::BAD_REQUEST, "DATASET_EXISTS"),
        StorageError::EmptyDataset(_) => (StatusCode::BAD_REQUEST, "EMPTY_DATASET"),
        StorageError::InvalidScore(_) => (StatusCode::BAD_REQUEST, "INVALID_SCORE"),
        StorageError::DatasetNotFound(_) => (StatusCode::NOT_FOUND, "DATASET_NOT_FOUND"),
        StorageError::ReviewNotFound(_) => (StatusCode::NOT_FOUND, "REVIEW_NOT_FOUND"),
        StorageError::Io(_) | StorageError::Serialization(_) | StorageError::Corruption(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        let request_id = uuid::Uuid::new_v4().to_string();

        // Client errors are logged at debug level
        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::debug!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
