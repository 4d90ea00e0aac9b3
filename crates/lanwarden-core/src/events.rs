//! Event types handed to the notification collaborator.
//!
//! Every scan cycle emits lifecycle events plus one event per new finding
//! and per change event. Delivery is out of scope here; sinks decide what to
//! do with them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ChangeEvent, Finding, ScanId, Severity};

/// Unique identifier for an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// An event emitted during a scan cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    pub id: EventId,
    pub scan_id: ScanId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl ScanEvent {
    pub fn new(scan_id: ScanId, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            scan_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Severity used by sinks to filter what reaches a user.
    pub fn severity(&self) -> Severity {
        match &self.payload {
            EventPayload::FindingRaised(f) => f.severity,
            EventPayload::ChangeDetected(c) => c.severity,
            _ => Severity::Info,
        }
    }
}

/// The event payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    // ── Scan lifecycle ────────────────────────────────────────
    ScanStarted {
        target: String,
        tier: String,
        host_count: u32,
    },
    ScanCompleted {
        hosts_alive: u32,
        findings: u32,
        changes: u32,
        risk_score: f64,
        duration_ms: u64,
    },
    /// The cycle was cancelled; results up to this point were kept.
    ScanCancelled {
        hosts_scanned: u32,
        duration_ms: u64,
    },

    // ── Classification and drift ──────────────────────────────
    FindingRaised(Finding),
    ChangeDetected(ChangeEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;

    #[test]
    fn event_serialization_roundtrip() {
        let event = ScanEvent::new(
            ScanId::new(),
            EventPayload::ScanStarted {
                target: "192.168.1.0/24".to_string(),
                tier: "standard".to_string(),
                host_count: 254,
            },
        );

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: ScanEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, deserialized.id);
        assert_eq!(event.scan_id, deserialized.scan_id);
    }

    #[test]
    fn change_payload_carries_severity() {
        let event = ScanEvent::new(
            ScanId::new(),
            EventPayload::ChangeDetected(ChangeEvent {
                kind: ChangeKind::AttributeChanged,
                detector: "inventory".to_string(),
                subject: "10.0.0.4".to_string(),
                field: Some("mac".to_string()),
                previous: Some("AA:AA:AA:AA:AA:AA".to_string()),
                current: Some("BB:BB:BB:BB:BB:BB".to_string()),
                severity: Severity::High,
                timestamp: Utc::now(),
            }),
        );

        assert_eq!(event.severity(), Severity::High);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"ChangeDetected\""));
    }
}
