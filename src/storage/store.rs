//! Dataset Store
//!
//! Maps dataset ids to immutable in-memory snapshots and persists each
//! dataset as one JSON file under `<data_dir>/datasets/`, next to a small
//! `.info` file holding its `DatasetInfo` so listing never loads records.
//!
//! - Read path: `get` → cached `Arc<Dataset>` → (first access) load file
//! - Write path: `add` / `remove` → files → id map
//!
//! The id map sits behind a Tokio `RwLock`. Registration, removal and
//! first-time loads take the write lock, so they are serialized against
//! each other; queries only clone an `Arc` out of the map and never block
//! one another.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::storage::dataset::{validate_id, Dataset, DatasetFile, DatasetInfo, RecordSet};
use crate::storage::error::{StorageError, StorageResult};

const DATASET_EXTENSION: &str = "json";
const INFO_EXTENSION: &str = "info";

/// Registry of datasets keyed by id
pub struct DatasetStore {
    /// Directory holding one file per dataset
    dir: PathBuf,
    /// Loaded snapshots
    datasets: RwLock<HashMap<String, Arc<Dataset>>>,
}

impl DatasetStore {
    /// Open (creating if needed) the store rooted at `data_dir`
    pub async fn open(data_dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = data_dir.as_ref().join("datasets");
        tokio::fs::create_dir_all(&dir).await?;

        let store = Self {
            dir,
            datasets: RwLock::new(HashMap::new()),
        };

        let persisted = store.persisted_ids().await?;
        tracing::info!("Dataset store opened with {} persisted datasets", persisted.len());

        Ok(store)
    }

    /// Register a new dataset and persist it.
    ///
    /// Returns the ids of every dataset known after the addition.
    pub async fn add(&self, id: &str, records: RecordSet) -> StorageResult<Vec<String>> {
        validate_id(id)?;

        let mut datasets = self.datasets.write().await;

        let path = self.dataset_path(id);
        if datasets.contains_key(id) || tokio::fs::try_exists(&path).await? {
            return Err(StorageError::DatasetExists(id.to_string()));
        }
        if records.is_empty() {
            return Err(StorageError::EmptyDataset(id.to_string()));
        }

        let file = DatasetFile {
            id: id.to_string(),
            created_at: Utc::now(),
            data: records,
        };
        let content = serde_json::to_string(&file)?;
        let dataset = Dataset::from_file(file)?;

        // Info first: an orphaned info file is never listed
        let info = serde_json::to_string(&dataset.info())?;
        write_atomic(&self.info_path(id), info).await?;
        write_atomic(&path, content).await?;

        tracing::info!(
            dataset = %id,
            kind = %dataset.kind(),
            rows = dataset.len(),
            "Dataset added"
        );
        datasets.insert(id.to_string(), Arc::new(dataset));

        self.ids_including(&datasets).await
    }

    /// Remove a dataset from memory and disk, returning its id
    pub async fn remove(&self, id: &str) -> StorageResult<String> {
        validate_id(id)?;

        let mut datasets = self.datasets.write().await;

        // Disk first, so a failed delete leaves the snapshot in place
        let on_disk = remove_if_exists(&self.dataset_path(id)).await?;
        if let Err(e) = remove_if_exists(&self.info_path(id)).await {
            tracing::warn!(dataset = %id, "Failed to remove dataset info file: {}", e);
        }
        let in_memory = datasets.remove(id).is_some();

        if !in_memory && !on_disk {
            return Err(StorageError::DatasetNotFound(id.to_string()));
        }

        tracing::info!(dataset = %id, "Dataset removed");
        Ok(id.to_string())
    }

    /// Get the snapshot for `id`, loading it from disk on first access.
    ///
    /// Ids that could never name a dataset resolve to `None`.
    pub async fn get(&self, id: &str) -> StorageResult<Option<Arc<Dataset>>> {
        if validate_id(id).is_err() {
            return Ok(None);
        }

        if let Some(dataset) = self.datasets.read().await.get(id) {
            return Ok(Some(Arc::clone(dataset)));
        }

        let mut datasets = self.datasets.write().await;
        // Another task may have loaded it while we waited for the lock
        if let Some(dataset) = datasets.get(id) {
            return Ok(Some(Arc::clone(dataset)));
        }

        let Some(dataset) = self.load_file(id).await? else {
            return Ok(None);
        };
        let dataset = Arc::new(dataset);
        datasets.insert(id.to_string(), Arc::clone(&dataset));

        tracing::debug!(dataset = %id, rows = dataset.len(), "Dataset loaded from disk");
        Ok(Some(dataset))
    }

    /// Summaries of every dataset, sorted by id.
    ///
    /// Datasets not yet loaded are summarized from their info file; entries
    /// whose info cannot be read are skipped.
    pub async fn list(&self) -> StorageResult<Vec<DatasetInfo>> {
        let datasets = self.datasets.read().await;

        let mut infos = Vec::new();
        for id in self.ids_including(&datasets).await? {
            if let Some(dataset) = datasets.get(&id) {
                infos.push(dataset.info());
                continue;
            }
            match self.read_info(&id).await {
                Ok(info) => infos.push(info),
                Err(e) => tracing::warn!(dataset = %id, "Skipping dataset in listing: {}", e),
            }
        }
        Ok(infos)
    }

    /// Ids of every dataset, in memory or on disk, sorted
    pub async fn ids(&self) -> StorageResult<Vec<String>> {
        let datasets = self.datasets.read().await;
        self.ids_including(&datasets).await
    }

    /// Drop the in-memory snapshot of `id`; the next `get` reloads it.
    ///
    /// Returns whether a snapshot was held.
    pub async fn evict(&self, id: &str) -> bool {
        self.datasets.write().await.remove(id).is_some()
    }

    /// Number of snapshots currently held in memory
    pub async fn loaded_count(&self) -> usize {
        self.datasets.read().await.len()
    }

    async fn ids_including(
        &self,
        datasets: &HashMap<String, Arc<Dataset>>,
    ) -> StorageResult<Vec<String>> {
        let mut ids: BTreeSet<String> = datasets.keys().cloned().collect();
        ids.extend(self.persisted_ids().await?);
        Ok(ids.into_iter().collect())
    }

    async fn persisted_ids(&self) -> StorageResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == DATASET_EXTENSION).unwrap_or(false) {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match urlencoding::decode(stem) {
                    Ok(id) => ids.push(id.into_owned()),
                    Err(e) => tracing::warn!("Skipping dataset file {:?}: {}", path, e),
                }
            }
        }

        Ok(ids)
    }

    async fn load_file(&self, id: &str) -> StorageResult<Option<Dataset>> {
        let path = self.dataset_path(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: DatasetFile = serde_json::from_str(&content)?;
        if file.id != id {
            return Err(StorageError::Corruption(format!(
                "file {:?} holds dataset {:?}",
                path, file.id
            )));
        }

        Dataset::from_file(file).map(Some)
    }

    async fn read_info(&self, id: &str) -> StorageResult<DatasetInfo> {
        let path = self.info_path(id);
        let info: DatasetInfo = serde_json::from_str(&tokio::fs::read_to_string(&path).await?)?;
        if info.id != id {
            return Err(StorageError::Corruption(format!(
                "info file {:?} describes dataset {:?}",
                path, info.id
            )));
        }
        Ok(info)
    }

    fn info_path(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", urlencoding::encode(id), INFO_EXTENSION))
    }

    /// File name is the percent-encoded id, so any id maps to a single path component
    fn dataset_path(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", urlencoding::encode(id), DATASET_EXTENSION))
    }
}

/// Write through a sibling temp file, then rename into place
async fn write_atomic(path: &Path, content: String) -> StorageResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Delete `path`, reporting whether it existed
async fn remove_if_exists(path: &Path) -> StorageResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
