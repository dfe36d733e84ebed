//! Campus Insight Storage
//!
//! This module holds the record model and the two persistent stores:
//!
//! - **types**: Record model (Section, Room, FieldLookup, Schema)
//! - **dataset**: Immutable datasets and their on-disk form
//! - **store**: Dataset registry with lazy loading and persistence
//! - **reviews**: Per-room review scores
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   RecordSet → validate id → JSON file → id map
//!
//! Read Path:
//!   id → id map (hit) → Arc<Dataset>
//!      → JSON file (first access) → id map → Arc<Dataset>
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use campus_insight::storage::{DatasetStore, RecordSet};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DatasetStore::open("./data").await?;
//!
//!     let records = serde_json::from_str(r#"[]"#)?;
//!     let ids = store.add("rooms", RecordSet::Rooms(records)).await;
//!     assert!(ids.is_err()); // empty datasets are rejected
//!
//!     for info in store.list().await? {
//!         println!("{} ({}): {} rows", info.id, info.kind, info.num_rows);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod dataset;
pub mod error;
pub mod reviews;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use dataset::{validate_id, Dataset, DatasetFile, DatasetInfo, RecordSet};
pub use error::{StorageError, StorageResult};
pub use reviews::{ReviewStore, ReviewSummary};
pub use store::DatasetStore;
pub use types::{
    DatasetKind, FieldKind, FieldLookup, FieldRef, Record, Room, Schema, Section, Value,
    KEY_SEPARATOR,
};
