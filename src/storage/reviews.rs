//! Room reviews
//!
//! Keeps a running `(sum, count)` of review scores per room name and
//! persists the whole map as one JSON object:
//!
//! ```text
//! { "Hugh Dempster Pavilion 110": [9.5, 2], ... }
//! ```
//!
//! The store is owned by the application state and handed to the handlers
//! that need it; the query engine never sees it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::storage::error::{StorageError, StorageResult};

/// Highest accepted review score
pub const MAX_SCORE: f64 = 5.0;

/// Aggregate review state for one room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewSummary {
    pub room: String,
    pub total: f64,
    pub count: u64,
    /// `None` until the first review is submitted
    pub average: Option<f64>,
}

impl ReviewSummary {
    fn new(room: &str, (total, count): (f64, u64)) -> Self {
        Self {
            room: room.to_string(),
            total,
            count,
            average: (count > 0).then(|| total / count as f64),
        }
    }
}

/// Persistent room review store
pub struct ReviewStore {
    path: PathBuf,
    reviews: Mutex<HashMap<String, (f64, u64)>>,
}

impl ReviewStore {
    /// Load reviews from `path`.
    ///
    /// A missing or unreadable file starts an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let reviews = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(reviews) => reviews,
                Err(e) => {
                    tracing::warn!("Ignoring unreadable review file {:?}: {}", path, e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!("Failed to read review file {:?}: {}", path, e);
                HashMap::new()
            }
        };

        tracing::info!("Loaded reviews for {} rooms", reviews.len());

        Self {
            path,
            reviews: Mutex::new(reviews),
        }
    }

    /// Review summary for `room`
    pub async fn get(&self, room: &str) -> StorageResult<ReviewSummary> {
        let reviews = self.reviews.lock().await;
        reviews
            .get(room)
            .map(|entry| ReviewSummary::new(room, *entry))
            .ok_or_else(|| StorageError::ReviewNotFound(room.to_string()))
    }

    /// Record a score for `room` and persist the store
    pub async fn submit(&self, room: &str, score: f64) -> StorageResult<ReviewSummary> {
        if !score.is_finite() || !(0.0..=MAX_SCORE).contains(&score) {
            return Err(StorageError::InvalidScore(score));
        }

        let mut reviews = self.reviews.lock().await;
        let (total, count) = reviews.get(room).copied().unwrap_or((0.0, 0));
        let updated = (total + score, count + 1);
        self.commit(&mut reviews, room, updated).await?;

        let summary = ReviewSummary::new(room, updated);
        tracing::debug!(room = %room, score, count = summary.count, "Review recorded");
        Ok(summary)
    }

    /// Create and persist an empty entry for `room` if it has none
    pub async fn initialize(&self, room: &str) -> StorageResult<ReviewSummary> {
        let mut reviews = self.reviews.lock().await;
        if let Some(entry) = reviews.get(room) {
            return Ok(ReviewSummary::new(room, *entry));
        }

        self.commit(&mut reviews, room, (0.0, 0)).await?;
        tracing::debug!(room = %room, "Review entry initialized");
        Ok(ReviewSummary::new(room, (0.0, 0)))
    }

    /// Persist the current state
    pub async fn save(&self) -> StorageResult<()> {
        let reviews = self.reviews.lock().await;
        Self::write(&self.path, &reviews).await
    }

    /// Number of rooms with an entry
    pub async fn len(&self) -> usize {
        self.reviews.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.reviews.lock().await.is_empty()
    }

    /// Set `room` to `entry` and persist; memory is left untouched if the write fails
    async fn commit(
        &self,
        reviews: &mut HashMap<String, (f64, u64)>,
        room: &str,
        entry: (f64, u64),
    ) -> StorageResult<()> {
        let previous = reviews.insert(room.to_string(), entry);

        if let Err(e) = Self::write(&self.path, reviews).await {
            match previous {
                Some(previous) => reviews.insert(room.to_string(), previous),
                None => reviews.remove(room),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn write(path: &Path, reviews: &HashMap<String, (f64, u64)>) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(reviews)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
