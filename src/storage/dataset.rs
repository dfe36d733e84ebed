//! Datasets: an id, a record kind and an ordered, homogeneous record list
//!
//! A `Dataset` is built once from a `RecordSet` and is never mutated
//! afterwards; the store hands out `Arc<Dataset>` snapshots to queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{DatasetKind, Record, Room, Section, KEY_SEPARATOR};

/// Typed records of a single kind, as submitted for ingestion and as persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "records", rename_all = "lowercase")]
pub enum RecordSet {
    Sections(Vec<Section>),
    Rooms(Vec<Room>),
}

impl RecordSet {
    /// Parse a JSON array of records of the given kind.
    ///
    /// Every record must carry every field of its kind with the right type.
    pub fn from_json(kind: DatasetKind, records: serde_json::Value) -> StorageResult<Self> {
        Ok(match kind {
            DatasetKind::Sections => RecordSet::Sections(serde_json::from_value(records)?),
            DatasetKind::Rooms => RecordSet::Rooms(serde_json::from_value(records)?),
        })
    }

    pub fn kind(&self) -> DatasetKind {
        match self {
            RecordSet::Sections(_) => DatasetKind::Sections,
            RecordSet::Rooms(_) => DatasetKind::Rooms,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordSet::Sections(s) => s.len(),
            RecordSet::Rooms(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_records(self) -> Vec<Record> {
        match self {
            RecordSet::Sections(s) => s.into_iter().map(Record::Section).collect(),
            RecordSet::Rooms(r) => r.into_iter().map(Record::Room).collect(),
        }
    }
}

/// Check that `id` can name a dataset: non-blank and free of the key separator
pub fn validate_id(id: &str) -> StorageResult<()> {
    if id.trim().is_empty() || id.contains(KEY_SEPARATOR) {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Summary of a registered dataset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetInfo {
    pub id: String,
    pub kind: DatasetKind,
    pub num_rows: usize,
    pub created_at: DateTime<Utc>,
}

/// On-disk representation of a dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub data: RecordSet,
}

/// An immutable, homogeneous collection of records
#[derive(Debug, Clone)]
pub struct Dataset {
    id: String,
    kind: DatasetKind,
    records: Vec<Record>,
    created_at: DateTime<Utc>,
}

impl Dataset {
    /// Build a dataset, rejecting bad ids and empty record sets
    pub fn new(id: impl Into<String>, records: RecordSet) -> StorageResult<Self> {
        Self::with_created_at(id.into(), records, Utc::now())
    }

    /// Rebuild a dataset from its persisted form
    pub fn from_file(file: DatasetFile) -> StorageResult<Self> {
        Self::with_created_at(file.id, file.data, file.created_at)
    }

    fn with_created_at(
        id: String,
        records: RecordSet,
        created_at: DateTime<Utc>,
    ) -> StorageResult<Self> {
        validate_id(&id)?;
        if records.is_empty() {
            return Err(StorageError::EmptyDataset(id));
        }

        Ok(Self {
            kind: records.kind(),
            records: records.into_records(),
            id,
            created_at,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    /// Records in insertion order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            id: self.id.clone(),
            kind: self.kind,
            num_rows: self.records.len(),
            created_at: self.created_at,
        }
    }
}
