//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.
//!
//! Successful responses wrap their payload as `{ "result": ... }`.

use serde::{Deserialize, Serialize};

use crate::query::{QueryOutput, ResultRow};

/// Generic `{ "result": ... }` envelope
#[derive(Debug, Serialize)]
pub struct ResultResponse<T> {
    pub result: T,
}

impl<T> ResultResponse<T> {
    pub fn new(result: T) -> Self {
        Self { result }
    }
}

// ============================================
// QUERY DTOs
// ============================================

/// Query string parameters for POST /api/v1/query
#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    /// Response format: "json" (default) or "csv"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "json".to_string()
}

/// Query response
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    /// Result rows, each a `{ column: value }` object
    pub result: Vec<ResultRow>,
    /// Column names, in COLUMNS order
    pub columns: Vec<String>,
    /// Query metadata
    pub meta: QueryMeta,
}

/// Query metadata
#[derive(Debug, Serialize)]
pub struct QueryMeta {
    /// Query execution time in milliseconds
    pub execution_time_ms: u64,
    /// Number of rows returned
    pub row_count: usize,
    /// Records in the queried dataset
    pub records_scanned: usize,
}

impl From<QueryOutput> for QueryResponse {
    fn from(output: QueryOutput) -> Self {
        Self {
            meta: QueryMeta {
                execution_time_ms: output.execution_time_ms,
                row_count: output.rows.len(),
                records_scanned: output.records_scanned,
            },
            columns: output.columns,
            result: output.rows,
        }
    }
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, unhealthy
    pub status: String,
    /// Storage status
    pub storage: String,
    /// Registered datasets
    pub datasets: usize,
    /// Datasets currently held in memory
    pub loaded_datasets: usize,
    /// Rooms with review entries
    pub reviewed_rooms: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
