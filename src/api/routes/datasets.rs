//! Dataset Routes
//!
//! Endpoints for registering, listing and removing datasets.
//!
//! - GET /api/v1/datasets - List all datasets
//! - PUT /api/v1/dataset/:id/:kind - Add a dataset from a JSON record array
//! - DELETE /api/v1/dataset/:id - Remove a dataset

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::ResultResponse;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::storage::{DatasetInfo, DatasetKind, RecordSet};

/// GET /api/v1/datasets
///
/// List every registered dataset with its kind and row count.
pub async fn list_datasets(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ResultResponse<Vec<DatasetInfo>>>> {
    let datasets = state.store.list().await?;
    Ok(Json(ResultResponse::new(datasets)))
}

/// PUT /api/v1/dataset/:id/:kind
///
/// Register a dataset. The body is a JSON array of records of `kind`;
/// every record must carry every field of that kind with the right type.
/// Returns the ids of all datasets after the addition.
pub async fn add_dataset(
    State(state): State<Arc<AppState>>,
    Path((id, kind)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<ResultResponse<Vec<String>>>> {
    let kind: DatasetKind = kind.parse()?;

    if !body.is_array() {
        return Err(ApiError::Validation(
            "Request body must be a JSON array of records".to_string(),
        ));
    }
    let records = RecordSet::from_json(kind, body)
        .map_err(|e| ApiError::Validation(format!("Invalid {} records: {}", kind, e)))?;

    let ids = state.store.add(&id, records).await?;
    Ok(Json(ResultResponse::new(ids)))
}

/// DELETE /api/v1/dataset/:id
///
/// Remove a dataset and its persisted file.
pub async fn remove_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResultResponse<String>>> {
    let removed = state.store.remove(&id).await?;
    Ok(Json(ResultResponse::new(removed)))
}
