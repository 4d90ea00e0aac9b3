//! Keyed entity snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable-by-convention set of entities captured at one instant,
/// keyed by the detector's key function.
///
/// `scheme` names the key function ("address", "address:port"). Two
/// snapshots can only be diffed when their schemes agree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot<V> {
    pub scheme: String,
    pub captured_at: DateTime<Utc>,
    pub entries: BTreeMap<String, V>,
}

impl<V> Snapshot<V> {
    pub fn new(scheme: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            scheme: scheme.into(),
            captured_at,
            entries: BTreeMap::new(),
        }
    }

    /// Build a snapshot by keying every entity with `key`. A later entity
    /// with a duplicate key replaces the earlier one.
    pub fn from_entities<I, F>(
        scheme: impl Into<String>,
        captured_at: DateTime<Utc>,
        entities: I,
        key: F,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        F: Fn(&V) -> String,
    {
        let mut snapshot = Self::new(scheme, captured_at);
        for entity in entities {
            snapshot.entries.insert(key(&entity), entity);
        }
        snapshot
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
