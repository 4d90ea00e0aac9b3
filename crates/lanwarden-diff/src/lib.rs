//! lanwarden-diff: change detection between successive scan snapshots.
//!
//! `engine::diff` partitions two keyed snapshots into added, removed,
//! changed, and unchanged keys and emits `ChangeEvent`s. The detectors in
//! `inventory`, `ai`, and `anomaly` supply the key function, comparator,
//! and severity policy for their entity type.

pub mod ai;
pub mod anomaly;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod snapshot;

pub use ai::AiServiceDetector;
pub use anomaly::AnomalyDetector;
pub use engine::{diff, Comparator, DefaultSeverity, DiffReport, FieldChange, SeverityPolicy};
pub use error::{DiffError, Result};
pub use inventory::InventoryDetector;
pub use snapshot::Snapshot;
