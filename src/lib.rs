//! # Campus Insight
//!
//! Register course-section and room datasets and run structured JSON
//! queries against them.
//!
//! ## Features
//!
//! - **Typed datasets**: section and room records, persisted as JSON and
//!   lazily loaded on first use
//! - **JSON query trees**: `WHERE` filters with `AND`/`OR`/`NOT`, numeric
//!   comparisons and wildcard string matching
//! - **Transformations**: `GROUP` by any fields, `APPLY` with
//!   `MAX`/`MIN`/`AVG`/`SUM`/`COUNT`
//! - **Ordering and projection**: multi-key ordering, column selection and
//!   a configurable result cap
//! - **Room reviews**: per-room running scores
//!
//! ## Modules
//!
//! - [`storage`]: Record model, dataset store and review store
//! - [`query`]: Query validator, filter evaluator and executor
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use campus_insight::query::QueryExecutor;
//! use campus_insight::storage::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(DatasetStore::open("./data").await?);
//!
//!     let records = serde_json::from_str(r#"[{
//!         "uuid": "1", "id": "310", "title": "sftwr eng", "instructor": "holmes, reid",
//!         "dept": "cpsc", "year": 2015, "avg": 97.5, "pass": 40, "fail": 2, "audit": 0
//!     }]"#)?;
//!     store.add("sections", RecordSet::from_json(DatasetKind::Sections, records)?).await?;
//!
//!     let executor = QueryExecutor::new(Arc::clone(&store), 5000);
//!     let output = executor
//!         .perform_query(&serde_json::json!({
//!             "WHERE": { "GT": { "sections_avg": 97 } },
//!             "OPTIONS": { "COLUMNS": ["sections_dept", "sections_avg"] }
//!         }))
//!         .await?;
//!
//!     println!("Found {} rows", output.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    Dataset, DatasetInfo, DatasetKind, DatasetStore, Record, RecordSet, ReviewStore,
    ReviewSummary, Room, Section, StorageError, StorageResult, Value,
};

pub use query::{Query, QueryError, QueryExecutor, QueryOutput, QueryResult, ResultRow};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use config::{
    ApiConfig as ConfigApiConfig, Config, ConfigError, LoggingConfig, QueryConfig,
    StorageConfig,
};
