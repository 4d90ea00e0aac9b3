//! Event sinks: where a cycle's `ScanEvent`s go.
//!
//! Delivery (push, email, webhooks) lives outside this crate. A sink only
//! has to accept events; it must not fail the cycle.

use std::sync::Mutex;

use lanwarden_core::events::{EventPayload, ScanEvent};
use lanwarden_core::types::Severity;

pub trait EventSink: Send + Sync {
    fn publish(&self, event: &ScanEvent);
}

/// Writes each event as a structured log line. High and critical events
/// are logged at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &ScanEvent) {
        let severity = event.severity();
        let loud = severity >= Severity::High;

        match &event.payload {
            EventPayload::ScanStarted {
                target,
                tier,
                host_count,
            } => {
                tracing::info!(scan_id = %event.scan_id, %target, %tier, host_count, "Scan started");
            }
            EventPayload::ScanCompleted {
                hosts_alive,
                findings,
                changes,
                risk_score,
                duration_ms,
            } => {
                tracing::info!(
                    scan_id = %event.scan_id,
                    hosts_alive,
                    findings,
                    changes,
                    risk_score,
                    duration_ms,
                    "Scan completed"
                );
            }
            EventPayload::ScanCancelled {
                hosts_scanned,
                duration_ms,
            } => {
                tracing::warn!(scan_id = %event.scan_id, hosts_scanned, duration_ms, "Scan cancelled");
            }
            EventPayload::FindingRaised(f) => {
                if loud {
                    tracing::warn!(
                        scan_id = %event.scan_id,
                        rule = %f.rule_id,
                        severity = %f.severity,
                        host = %f.address,
                        port = ?f.port,
                        title = %f.title,
                        "Finding"
                    );
                } else {
                    tracing::info!(
                        scan_id = %event.scan_id,
                        rule = %f.rule_id,
                        severity = %f.severity,
                        host = %f.address,
                        port = ?f.port,
                        "Finding"
                    );
                }
            }
            EventPayload::ChangeDetected(c) => {
                if loud {
                    tracing::warn!(
                        scan_id = %event.scan_id,
                        detector = %c.detector,
                        kind = ?c.kind,
                        subject = %c.subject,
                        field = ?c.field,
                        previous = ?c.previous,
                        current = ?c.current,
                        severity = %c.severity,
                        "Change detected"
                    );
                } else {
                    tracing::info!(
                        scan_id = %event.scan_id,
                        detector = %c.detector,
                        kind = ?c.kind,
                        subject = %c.subject,
                        field = ?c.field,
                        severity = %c.severity,
                        "Change detected"
                    );
                }
            }
        }
    }
}

/// Keeps every event. Useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ScanEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: &ScanEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Fans events out to several sinks in order.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for MultiSink {
    fn publish(&self, event: &ScanEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lanwarden_core::types::ScanId;

    use super::*;

    fn started() -> ScanEvent {
        ScanEvent::new(
            ScanId::new(),
            EventPayload::ScanStarted {
                target: "10.0.0.0/24".to_string(),
                tier: "quick".to_string(),
                host_count: 254,
            },
        )
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let a = started();
        let b = started();
        sink.publish(&a);
        sink.publish(&b);
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, a.id);
        assert_eq!(events[1].id, b.id);
    }

    #[test]
    fn multi_sink_fans_out() {
        let first = Arc::new(MemorySink::new());
        let second = Arc::new(MemorySink::new());
        let multi = MultiSink::new(vec![first.clone(), second.clone(), Arc::new(TracingSink)]);
        multi.publish(&started());
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
