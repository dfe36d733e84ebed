//! Campus Insight REST API
//!
//! HTTP API layer for Campus Insight, built with Axum.
//!
//! # Endpoints
//!
//! ## Datasets
//! - `GET /api/v1/datasets` - List all datasets
//! - `PUT /api/v1/dataset/:id/:kind` - Add a dataset (`sections` or `rooms`)
//! - `DELETE /api/v1/dataset/:id` - Remove a dataset
//!
//! ## Query
//! - `POST /api/v1/query` - Execute a query tree
//!
//! ## Reviews
//! - `GET /api/v1/reviews/:room` - Review summary for a room
//! - `PUT /api/v1/reviews/:room` - Open an empty review entry
//! - `POST /api/v1/reviews/:room/:score` - Submit a score
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_insight::api::{build_router, serve, ApiConfig, AppState};
//! use campus_insight::storage::{DatasetStore, ReviewStore};
//! use campus_insight::query::QueryExecutor;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(DatasetStore::open("./data").await?);
//!     let executor = Arc::new(QueryExecutor::new(Arc::clone(&store), 5000));
//!     let reviews = Arc::new(ReviewStore::open("./data/room_reviews.json").await);
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(store, executor, reviews, config.clone());
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Dataset routes
        .route("/datasets", get(routes::datasets::list_datasets))
        .route("/dataset/:id/:kind", put(routes::datasets::add_dataset))
        .route(
            "/dataset/:id",
            axum::routing::delete(routes::datasets::remove_dataset),
        )
        // Query routes
        .route("/query", post(routes::query::perform_query))
        // Review routes
        .route(
            "/reviews/:room",
            get(routes::reviews::get_review).put(routes::reviews::initialize_review),
        )
        .route("/reviews/:room/:score", post(routes::reviews::submit_review))
        // Dataset uploads can be large
        .layer(DefaultBodyLimit::max(state.config.max_body_size));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config.cors_origins);

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Permissive when no origins are configured, else restricted to `origins`
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Campus Insight API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Campus Insight API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
