//! Query Routes
//!
//! Endpoint for executing dataset queries.
//!
//! - POST /api/v1/query - Execute a query tree (`?format=csv` for CSV)

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{QueryParams, QueryResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::query::QueryOutput;

/// POST /api/v1/query
///
/// Validate and execute a query tree against the dataset it names.
pub async fn perform_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
    Json(tree): Json<serde_json::Value>,
) -> ApiResult<Response> {
    let output = state.executor.perform_query(&tree).await?;

    match params.format.to_lowercase().as_str() {
        "csv" => format_csv_response(&output),
        "json" => Ok((StatusCode::OK, Json(QueryResponse::from(output))).into_response()),
        other => Err(ApiError::Validation(format!(
            "Invalid format: {}. Use json or csv",
            other
        ))),
    }
}

/// Format response as CSV, one column per COLUMNS entry
fn format_csv_response(output: &QueryOutput) -> ApiResult<Response> {
    let csv = to_csv(output)?;

    Ok((
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/csv")],
        csv,
    )
        .into_response())
}

fn to_csv(output: &QueryOutput) -> ApiResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(&output.columns)
        .map_err(|e| ApiError::Internal(format!("CSV encoding failed: {}", e)))?;
    for row in &output.rows {
        let record = output
            .columns
            .iter()
            .map(|col| row.get(col).map(|v| v.to_string()).unwrap_or_default());
        writer
            .write_record(record)
            .map_err(|e| ApiError::Internal(format!("CSV encoding failed: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV encoding failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ApiError::Internal(format!("CSV encoding failed: {}", e)))
}
