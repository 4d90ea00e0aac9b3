//! Lanwarden Store: persistence for the "previous snapshot".
//!
//! The diff engine is stateless; whatever it compared against last cycle has
//! to live somewhere between runs. Snapshots are sealed into a
//! `SnapshotRecord` whose content is hashed with BLAKE3, so a tampered or
//! half-written file is detected on load instead of silently producing a
//! bogus diff.

pub mod cell;
pub mod hash;
pub mod store;

pub use cell::SnapshotCell;
pub use store::{JsonSnapshotStore, MemorySnapshotStore, SnapshotStore, StoreError};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A persisted snapshot, keyed by `name` (for example "inventory").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    pub name: String,
    pub saved_at: DateTime<Utc>,
    /// The snapshot itself, as JSON.
    pub content: serde_json::Value,
    /// BLAKE3 content hash (hex), set by `seal`.
    pub content_hash: Option<String>,
}

impl SnapshotRecord {
    /// Serialize `value` and compute its content hash.
    pub fn seal<T: Serialize>(name: &str, value: &T) -> Result<Self, StoreError> {
        let mut record = Self {
            name: name.to_string(),
            saved_at: Utc::now(),
            content: serde_json::to_value(value)?,
            content_hash: None,
        };
        record.content_hash = Some(record.compute_hash());
        Ok(record)
    }

    /// Compute the BLAKE3 hash of the record's content.
    pub fn compute_hash(&self) -> String {
        hash::compute_record_hash(self)
    }

    /// Verify that the stored content_hash matches a freshly computed hash.
    pub fn verify_integrity(&self) -> bool {
        match &self.content_hash {
            Some(stored) => stored == &self.compute_hash(),
            None => false,
        }
    }

    /// Deserialize the content back into its typed form.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.content.clone())?)
    }
}
