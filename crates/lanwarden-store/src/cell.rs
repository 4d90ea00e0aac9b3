//! In-memory holder for the previous snapshot of one detector.
//!
//! Writers are serialised through an async mutex: a cycle takes the writer,
//! diffs against `previous()`, then `commit`s the new snapshot. Readers never
//! take that lock; they get an `Arc` of whichever snapshot was last committed.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::store::{SnapshotStore, StoreError};
use crate::SnapshotRecord;

pub struct SnapshotCell<T> {
    name: String,
    current: watch::Sender<Option<Arc<T>>>,
    writer: Mutex<()>,
}

impl<T> SnapshotCell<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// A cell with no previous snapshot.
    pub fn empty(name: &str) -> Self {
        Self::with_value(name, None)
    }

    /// Load the previous snapshot from `store`. A missing record is not an
    /// error: the cell starts empty and the first diff is a first observation.
    pub fn load(name: &str, store: &dyn SnapshotStore) -> Result<Self, StoreError> {
        let value = match store.load(name)? {
            Some(record) => Some(Arc::new(record.decode::<T>()?)),
            None => None,
        };
        tracing::debug!(snapshot = name, present = value.is_some(), "Snapshot cell loaded");
        Ok(Self::with_value(name, value))
    }

    fn with_value(name: &str, value: Option<Arc<T>>) -> Self {
        let (current, _) = watch::channel(value);
        Self {
            name: name.to_string(),
            current,
            writer: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest committed snapshot. Lock-free for readers.
    pub fn current(&self) -> Option<Arc<T>> {
        self.current.borrow().clone()
    }

    /// Receiver notified on every commit.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.current.subscribe()
    }

    /// Take the single writer slot. Concurrent cycles queue here.
    pub async fn writer(&self) -> CellWriter<'_, T> {
        let guard = self.writer.lock().await;
        CellWriter {
            cell: self,
            _guard: guard,
        }
    }
}

/// Exclusive write access to a `SnapshotCell`.
pub struct CellWriter<'a, T> {
    cell: &'a SnapshotCell<T>,
    _guard: MutexGuard<'a, ()>,
}

impl<'a, T> CellWriter<'a, T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn previous(&self) -> Option<Arc<T>> {
        self.cell.current()
    }

    /// Swap in `value` and persist it.
    ///
    /// The in-memory swap happens even if persisting fails, so the next cycle
    /// diffs against what was actually observed; the store error is returned
    /// for the caller to report.
    pub fn commit(self, value: T, store: &dyn SnapshotStore) -> Result<Arc<T>, StoreError> {
        let record = SnapshotRecord::seal(&self.cell.name, &value)?;
        let value = Arc::new(value);
        self.cell.current.send_replace(Some(value.clone()));
        store.save(&record)?;
        Ok(value)
    }
}
