//! Port anomalies: per-host open-port set changes, keyed by address.
//!
//! Each opened or closed port becomes its own `port:<n>` field change so a
//! single scan that opens a database port and closes a web port produces
//! two events with different severities.

use chrono::{DateTime, Utc};
use lanwarden_core::services::{ServiceCategory, ServiceKnowledgeBase};
use lanwarden_core::types::{HostRecord, Severity};

use crate::engine::{self, Comparator, DiffReport, FieldChange, SeverityPolicy};
use crate::error::Result;
use crate::snapshot::Snapshot;

pub const DETECTOR: &str = "anomaly";
pub const SCHEME: &str = "address";

/// Net growth in open ports that counts as a burst.
pub const DEFAULT_BURST_THRESHOLD: usize = 5;

const PORT_FIELD_PREFIX: &str = "port:";
const BURST_FIELD: &str = "open_ports";

pub fn snapshot<'a, I>(hosts: I, captured_at: DateTime<Utc>) -> Snapshot<HostRecord>
where
    I: IntoIterator<Item = &'a HostRecord>,
{
    Snapshot::from_entities(
        SCHEME,
        captured_at,
        hosts.into_iter().filter(|h| h.alive).cloned(),
        |h| h.address.to_string(),
    )
}

pub struct AnomalyDetector {
    kb: ServiceKnowledgeBase,
    burst_threshold: usize,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(ServiceKnowledgeBase::standard(), DEFAULT_BURST_THRESHOLD)
    }
}

impl AnomalyDetector {
    pub fn new(kb: ServiceKnowledgeBase, burst_threshold: usize) -> Self {
        Self {
            kb,
            burst_threshold: burst_threshold.max(1),
        }
    }

    pub fn detect(
        &self,
        previous: Option<&Snapshot<HostRecord>>,
        current: &Snapshot<HostRecord>,
    ) -> Result<DiffReport> {
        engine::diff(DETECTOR, previous, current, self, self)
    }

    fn is_high_risk(&self, port: u16, label: Option<&str>) -> bool {
        matches!(
            self.kb.category(port, label),
            Some(
                ServiceCategory::Backdoor
                    | ServiceCategory::Database
                    | ServiceCategory::RemoteAccess
                    | ServiceCategory::AiInference
            )
        )
    }
}

fn label_of(host: &HostRecord, port: u16) -> String {
    host.port(port)
        .map(|p| p.label.clone())
        .unwrap_or_else(|| port.to_string())
}

impl Comparator<HostRecord> for AnomalyDetector {
    fn compare(&self, previous: &HostRecord, current: &HostRecord) -> Vec<FieldChange> {
        let before = previous.open_port_set();
        let after = current.open_port_set();
        let mut changes = Vec::new();

        for port in before.symmetric_difference(&after) {
            let field = format!("{PORT_FIELD_PREFIX}{port}");
            if after.contains(port) {
                changes.push(FieldChange::new(field, None, Some(label_of(current, *port))));
            } else {
                changes.push(FieldChange::new(field, Some(label_of(previous, *port)), None));
            }
        }

        if after.len() >= before.len() + self.burst_threshold {
            changes.push(FieldChange::new(
                BURST_FIELD,
                Some(before.len().to_string()),
                Some(after.len().to_string()),
            ));
        }

        changes
    }

    fn describe(&self, host: &HostRecord) -> Option<String> {
        Some(format!("{} open ports", host.open_ports().count()))
    }
}

impl SeverityPolicy<HostRecord> for AnomalyDetector {
    // Host arrival and departure belong to the inventory detector.
    fn appeared(&self, _key: &str, _host: &HostRecord) -> Severity {
        Severity::Info
    }

    fn disappeared(&self, _key: &str, _host: &HostRecord) -> Severity {
        Severity::Info
    }

    fn changed(
        &self,
        _key: &str,
        _previous: &HostRecord,
        _current: &HostRecord,
        change: &FieldChange,
    ) -> Severity {
        if change.field == BURST_FIELD {
            return Severity::High;
        }
        let Some(port) = change
            .field
            .strip_prefix(PORT_FIELD_PREFIX)
            .and_then(|p| p.parse::<u16>().ok())
        else {
            return Severity::Medium;
        };
        match &change.current {
            Some(label) if self.is_high_risk(port, Some(label.as_str())) => Severity::High,
            Some(_) => Severity::Low,
            None => Severity::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use lanwarden_core::types::PortRecord;

    use super::*;

    fn host_with(ports: &[(u16, &str)]) -> HostRecord {
        let mut h = HostRecord::discovered(Ipv4Addr::new(10, 1, 1, 1), Utc::now());
        h.ports = ports.iter().map(|(p, l)| PortRecord::open(*p, *l)).collect();
        h
    }

    fn run(before: HostRecord, after: HostRecord) -> DiffReport {
        AnomalyDetector::default()
            .detect(
                Some(&snapshot(&[before], Utc::now())),
                &snapshot(&[after], Utc::now()),
            )
            .unwrap()
    }

    #[test]
    fn risky_port_opening_is_high() {
        let report = run(
            host_with(&[(80, "http")]),
            host_with(&[(80, "http"), (3306, "mysql")]),
        );
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].field.as_deref(), Some("port:3306"));
        assert_eq!(report.events[0].severity, Severity::High);
    }

    #[test]
    fn benign_opening_is_low_and_closing_info() {
        let report = run(
            host_with(&[(22, "ssh")]),
            host_with(&[(631, "ipp")]),
        );
        assert_eq!(report.events.len(), 2);
        let closed = report.events.iter().find(|e| e.field.as_deref() == Some("port:22")).unwrap();
        let opened = report.events.iter().find(|e| e.field.as_deref() == Some("port:631")).unwrap();
        assert_eq!(closed.severity, Severity::Info);
        assert_eq!(opened.severity, Severity::Low);
    }

    #[test]
    fn burst_of_new_ports_is_flagged() {
        let after: Vec<(u16, &str)> = (8000..8006).map(|p| (p, "unknown")).collect();
        let report = run(host_with(&[]), host_with(&after));

        let burst = report
            .events
            .iter()
            .find(|e| e.field.as_deref() == Some("open_ports"))
            .unwrap();
        assert_eq!(burst.severity, Severity::High);
        assert_eq!(burst.previous.as_deref(), Some("0"));
        assert_eq!(burst.current.as_deref(), Some("6"));
    }

    #[test]
    fn same_ports_no_events() {
        let report = run(host_with(&[(22, "ssh")]), host_with(&[(22, "ssh")]));
        assert!(!report.has_changes());
    }
}
