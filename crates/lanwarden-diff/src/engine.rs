//! Generic snapshot diff.
//!
//! The engine only knows keys. What counts as a change (the `Comparator`)
//! and how bad each change is (the `SeverityPolicy`) are supplied by the
//! detector, so inventory drift, AI-service drift, and port anomalies all
//! run through the same partitioning code.

use chrono::{DateTime, Utc};
use lanwarden_core::types::{ChangeEvent, ChangeKind, Severity};
use serde::{Deserialize, Serialize};

use crate::error::{DiffError, Result};
use crate::snapshot::Snapshot;

/// One differing attribute of an entity present in both snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub previous: Option<String>,
    pub current: Option<String>,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, previous: Option<String>, current: Option<String>) -> Self {
        Self {
            field: field.into(),
            previous,
            current,
        }
    }

    /// Compare two optional values, producing a change only if they differ.
    pub fn between<T: PartialEq + ToString>(
        field: &str,
        previous: Option<&T>,
        current: Option<&T>,
    ) -> Option<Self> {
        if previous == current {
            return None;
        }
        Some(Self::new(
            field,
            previous.map(ToString::to_string),
            current.map(ToString::to_string),
        ))
    }
}

/// Decides which attributes of an entity differ between two snapshots.
pub trait Comparator<V> {
    /// Attribute-level differences. Empty means unchanged.
    fn compare(&self, previous: &V, current: &V) -> Vec<FieldChange>;

    /// Short rendering used as the value of appeared/disappeared events.
    fn describe(&self, _value: &V) -> Option<String> {
        None
    }
}

impl<V, F> Comparator<V> for F
where
    F: Fn(&V, &V) -> Vec<FieldChange>,
{
    fn compare(&self, previous: &V, current: &V) -> Vec<FieldChange> {
        self(previous, current)
    }
}

/// Maps each kind of difference to a severity.
pub trait SeverityPolicy<V> {
    fn appeared(&self, _key: &str, _value: &V) -> Severity {
        Severity::Medium
    }

    fn disappeared(&self, _key: &str, _value: &V) -> Severity {
        Severity::Low
    }

    fn changed(&self, _key: &str, _previous: &V, _current: &V, _change: &FieldChange) -> Severity {
        Severity::Medium
    }
}

/// Appeared medium, disappeared low, changed medium.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSeverity;

impl<V> SeverityPolicy<V> for DefaultSeverity {}

/// Result of one diff. `added`, `removed`, `changed`, and `unchanged` are
/// disjoint and sorted; together they cover every key of both snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiffReport {
    pub detector: String,
    /// No previous snapshot existed.
    pub first_observation: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    pub events: Vec<ChangeEvent>,
}

impl DiffReport {
    pub fn has_changes(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.events.iter().map(|e| e.severity).max()
    }

    pub fn events_at_least(&self, severity: Severity) -> impl Iterator<Item = &ChangeEvent> {
        self.events.iter().filter(move |e| e.severity >= severity)
    }
}

/// Diff `current` against `previous`.
///
/// With no previous snapshot every entity of `current` is added. Events use
/// `current.captured_at` as their timestamp and are ordered added, removed,
/// changed, each by key.
pub fn diff<V, C, P>(
    detector: &str,
    previous: Option<&Snapshot<V>>,
    current: &Snapshot<V>,
    comparator: &C,
    policy: &P,
) -> Result<DiffReport>
where
    C: Comparator<V> + ?Sized,
    P: SeverityPolicy<V> + ?Sized,
{
    let mut report = DiffReport {
        detector: detector.to_string(),
        first_observation: previous.is_none(),
        ..Default::default()
    };
    let at = current.captured_at;

    let Some(previous) = previous else {
        for (key, value) in &current.entries {
            report.added.push(key.clone());
            report.events.push(appeared(detector, key, value, at, comparator, policy));
        }
        return Ok(report);
    };

    if previous.scheme != current.scheme {
        return Err(DiffError::KeySchemeMismatch {
            previous: previous.scheme.clone(),
            current: current.scheme.clone(),
        });
    }

    let mut changes = Vec::new();
    for (key, value) in &current.entries {
        match previous.get(key) {
            None => {
                report.added.push(key.clone());
                report.events.push(appeared(detector, key, value, at, comparator, policy));
            }
            Some(old) => {
                let fields = comparator.compare(old, value);
                if fields.is_empty() {
                    report.unchanged.push(key.clone());
                } else {
                    report.changed.push(key.clone());
                    for change in fields {
                        changes.push(ChangeEvent {
                            kind: ChangeKind::AttributeChanged,
                            detector: detector.to_string(),
                            subject: key.clone(),
                            severity: policy.changed(key, old, value, &change),
                            field: Some(change.field),
                            previous: change.previous,
                            current: change.current,
                            timestamp: at,
                        });
                    }
                }
            }
        }
    }

    for (key, value) in &previous.entries {
        if !current.contains(key) {
            report.removed.push(key.clone());
            report.events.push(ChangeEvent {
                kind: ChangeKind::Disappeared,
                detector: detector.to_string(),
                subject: key.clone(),
                field: None,
                previous: comparator.describe(value),
                current: None,
                severity: policy.disappeared(key, value),
                timestamp: at,
            });
        }
    }

    report.events.extend(changes);

    tracing::debug!(
        detector,
        added = report.added.len(),
        removed = report.removed.len(),
        changed = report.changed.len(),
        unchanged = report.unchanged.len(),
        "Snapshot diff complete"
    );

    Ok(report)
}

fn appeared<V, C, P>(
    detector: &str,
    key: &str,
    value: &V,
    at: DateTime<Utc>,
    comparator: &C,
    policy: &P,
) -> ChangeEvent
where
    C: Comparator<V> + ?Sized,
    P: SeverityPolicy<V> + ?Sized,
{
    ChangeEvent {
        kind: ChangeKind::Appeared,
        detector: detector.to_string(),
        subject: key.to_string(),
        field: None,
        previous: None,
        current: comparator.describe(value),
        severity: policy.appeared(key, value),
        timestamp: at,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn value_cmp(a: &u32, b: &u32) -> Vec<FieldChange> {
        FieldChange::between("value", Some(a), Some(b)).into_iter().collect()
    }

    fn snap(pairs: &[(&str, u32)]) -> Snapshot<u32> {
        let mut s = Snapshot::new("name", Utc::now());
        for (k, v) in pairs {
            s.insert(*k, *v);
        }
        s
    }

    #[test]
    fn scenario_added_and_removed() {
        let old = snap(&[("A", 1), ("B", 1)]);
        let new = snap(&[("B", 1), ("C", 1)]);

        let report = diff("test", Some(&old), &new, &value_cmp, &DefaultSeverity).unwrap();

        assert_eq!(report.added, vec!["C"]);
        assert_eq!(report.removed, vec!["A"]);
        assert!(report.changed.is_empty());
        assert_eq!(report.unchanged, vec!["B"]);
        assert_eq!(report.events.len(), 2);
        assert_eq!(report.events[0].kind, ChangeKind::Appeared);
        assert_eq!(report.events[0].severity, Severity::Medium);
        assert_eq!(report.events[1].kind, ChangeKind::Disappeared);
        assert_eq!(report.events[1].severity, Severity::Low);
    }

    #[test]
    fn first_observation_adds_everything() {
        let new = snap(&[("A", 1), ("B", 2), ("C", 3)]);
        let report = diff("test", None, &new, &value_cmp, &DefaultSeverity).unwrap();

        assert!(report.first_observation);
        assert_eq!(report.added.len(), 3);
        assert!(report.removed.is_empty());
        assert!(report.changed.is_empty());
        assert_eq!(report.events.len(), 3);
        assert!(report.events.iter().all(|e| e.kind == ChangeKind::Appeared));
    }

    #[test]
    fn changed_event_carries_field_values() {
        let old = snap(&[("A", 1)]);
        let new = snap(&[("A", 2)]);
        let report = diff("test", Some(&old), &new, &value_cmp, &DefaultSeverity).unwrap();

        assert_eq!(report.changed, vec!["A"]);
        let event = &report.events[0];
        assert_eq!(event.kind, ChangeKind::AttributeChanged);
        assert_eq!(event.field.as_deref(), Some("value"));
        assert_eq!(event.previous.as_deref(), Some("1"));
        assert_eq!(event.current.as_deref(), Some("2"));
        assert_eq!(event.timestamp, new.captured_at);
    }

    #[test]
    fn scheme_mismatch_is_an_error() {
        let old = snap(&[("A", 1)]);
        let mut new = snap(&[("A", 1)]);
        new.scheme = "address:port".to_string();

        let err = diff("test", Some(&old), &new, &value_cmp, &DefaultSeverity).unwrap_err();
        assert!(matches!(err, DiffError::KeySchemeMismatch { .. }));
    }

    #[test]
    fn events_ordered_by_partition_then_key() {
        let old = snap(&[("a", 1), ("d", 1), ("e", 1), ("z", 1)]);
        let new = snap(&[("b", 1), ("c", 1), ("e", 2), ("z", 2)]);
        let report = diff("test", Some(&old), &new, &value_cmp, &DefaultSeverity).unwrap();

        let order: Vec<(ChangeKind, &str)> = report
            .events
            .iter()
            .map(|e| (e.kind, e.subject.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (ChangeKind::Appeared, "b"),
                (ChangeKind::Appeared, "c"),
                (ChangeKind::Disappeared, "a"),
                (ChangeKind::Disappeared, "d"),
                (ChangeKind::AttributeChanged, "e"),
                (ChangeKind::AttributeChanged, "z"),
            ]
        );
    }

    #[test]
    fn partitions_cover_symmetric_difference() {
        // Every pair of snapshots over keys {a,b,c,d} with values {1,2}.
        let keys = ["a", "b", "c", "d"];
        let states = 3usize.pow(keys.len() as u32);
        let build = |mut code: usize| {
            let mut s: Snapshot<u32> = Snapshot::new("name", Utc::now());
            for key in keys {
                match code % 3 {
                    1 => {
                        s.insert(key, 1);
                    }
                    2 => {
                        s.insert(key, 2);
                    }
                    _ => {}
                }
                code /= 3;
            }
            s
        };

        for i in 0..states {
            for j in 0..states {
                let old = build(i);
                let new = build(j);
                let report = diff("test", Some(&old), &new, &value_cmp, &DefaultSeverity).unwrap();

                let old_keys: BTreeSet<_> = old.keys().cloned().collect();
                let new_keys: BTreeSet<_> = new.keys().cloned().collect();
                let added: BTreeSet<_> = report.added.iter().cloned().collect();
                let removed: BTreeSet<_> = report.removed.iter().cloned().collect();
                let changed: BTreeSet<_> = report.changed.iter().cloned().collect();
                let unchanged: BTreeSet<_> = report.unchanged.iter().cloned().collect();

                assert_eq!(added, &new_keys - &old_keys);
                assert_eq!(removed, &old_keys - &new_keys);
                let common: BTreeSet<_> = &old_keys & &new_keys;
                assert_eq!(&changed | &unchanged, common);
                assert!(changed.is_disjoint(&unchanged));
                for key in &changed {
                    assert_ne!(old.get(key), new.get(key));
                }
                for key in &unchanged {
                    assert_eq!(old.get(key), new.get(key));
                }
            }
        }
    }

    #[test]
    fn identical_snapshots_produce_no_events() {
        let old = snap(&[("A", 1), ("B", 2)]);
        let new = snap(&[("A", 1), ("B", 2)]);
        let report = diff("test", Some(&old), &new, &value_cmp, &DefaultSeverity).unwrap();
        assert!(!report.has_changes());
        assert_eq!(report.max_severity(), None);
    }
}
