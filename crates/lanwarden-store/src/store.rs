//! Snapshot storage: the trait plus JSON-file and in-memory implementations.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::SnapshotRecord;

/// Errors that can occur during snapshot storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Integrity check failed for snapshot {0}: stored hash does not match content")]
    IntegrityViolation(String),

    #[error("Snapshot has no content hash (not sealed)")]
    NotSealed,

    #[error("Invalid snapshot name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence collaborator for snapshots.
///
/// Implementations must be safe to share across tasks; the orchestrator
/// serialises writes itself, so a store does not need its own write lock.
pub trait SnapshotStore: Send + Sync {
    /// Store a sealed record, replacing any previous record of the same name.
    fn save(&self, record: &SnapshotRecord) -> Result<(), StoreError>;

    /// Load a record by name, verifying integrity. `Ok(None)` means nothing
    /// has been stored yet (first observation).
    fn load(&self, name: &str) -> Result<Option<SnapshotRecord>, StoreError>;
}

/// File-system backed store: one pretty-printed JSON file per snapshot name.
///
/// ```text
/// {root}/
///   inventory.json
///   ai-services.json
/// ```
pub struct JsonSnapshotStore {
    root: PathBuf,
}

impl JsonSnapshotStore {
    /// Create a new store rooted at the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn record_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{name}.json")))
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn save(&self, record: &SnapshotRecord) -> Result<(), StoreError> {
        if record.content_hash.is_none() {
            return Err(StoreError::NotSealed);
        }

        let path = self.record_path(&record.name)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!(
            snapshot = %record.name,
            path = %path.display(),
            "Snapshot saved"
        );

        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<SnapshotRecord>, StoreError> {
        let path = self.record_path(name)?;
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)?;
        let record: SnapshotRecord = serde_json::from_str(&json)?;

        if !record.verify_integrity() {
            return Err(StoreError::IntegrityViolation(name.to_string()));
        }

        Ok(Some(record))
    }
}

/// Store that keeps records in memory. Used for one-shot runs and tests.
#[derive(Default)]
pub struct MemorySnapshotStore {
    records: Mutex<HashMap<String, SnapshotRecord>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, record: &SnapshotRecord) -> Result<(), StoreError> {
        if record.content_hash.is_none() {
            return Err(StoreError::NotSealed);
        }
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(record.name.clone(), record.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<SnapshotRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(name).cloned())
    }
}
