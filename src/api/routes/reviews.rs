//! Review Routes
//!
//! Per-room review scores.
//!
//! - GET /api/v1/reviews/:room - Review summary for a room
//! - PUT /api/v1/reviews/:room - Open an empty review entry for a room
//! - POST /api/v1/reviews/:room/:score - Submit a score between 0 and 5

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::ResultResponse;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::storage::ReviewSummary;

/// GET /api/v1/reviews/:room
pub async fn get_review(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> ApiResult<Json<ResultResponse<ReviewSummary>>> {
    let summary = state.reviews.get(&room).await?;
    Ok(Json(ResultResponse::new(summary)))
}

/// PUT /api/v1/reviews/:room
///
/// Create an empty entry so the room reports zero reviews instead of not found.
/// An existing entry is returned unchanged.
pub async fn initialize_review(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> ApiResult<Json<ResultResponse<ReviewSummary>>> {
    let summary = state.reviews.initialize(&room).await?;
    Ok(Json(ResultResponse::new(summary)))
}

/// POST /api/v1/reviews/:room/:score
///
/// Add a score to the room's running total and persist the review file.
pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    Path((room, score)): Path<(String, String)>,
) -> ApiResult<Json<ResultResponse<ReviewSummary>>> {
    let score: f64 = score
        .parse()
        .map_err(|_| ApiError::Validation(format!("Score must be a number, got {:?}", score)))?;

    let summary = state.reviews.submit(&room, score).await?;
    tracing::info!(room = %room, score, "Review submitted");

    Ok(Json(ResultResponse::new(summary)))
}
