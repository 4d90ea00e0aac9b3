//! Device-inventory drift: hosts keyed by address.

use chrono::{DateTime, Utc};
use lanwarden_core::services::{ServiceCategory, ServiceKnowledgeBase};
use lanwarden_core::types::{HostRecord, Severity};

use crate::engine::{self, Comparator, DiffReport, FieldChange, SeverityPolicy};
use crate::error::Result;
use crate::snapshot::Snapshot;

pub const DETECTOR: &str = "inventory";
pub const SCHEME: &str = "address";

/// Snapshot of the online hosts. Offline hosts stay in the inventory but
/// are left out here, so a host going silent shows up as disappeared.
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

fn render_ports(host: &HostRecord) -> String {
    host.open_port_set()
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct InventoryDetector {
    kb: ServiceKnowledgeBase,
}

impl InventoryDetector {
    pub fn new(kb: ServiceKnowledgeBase) -> Self {
        Self { kb }
    }

    pub fn detect(
        &self,
        previous: Option<&Snapshot<HostRecord>>,
        current: &Snapshot<HostRecord>,
    ) -> Result<DiffReport> {
        engine::diff(DETECTOR, previous, current, self, self)
    }

    fn exposes_backdoor(&self, host: &HostRecord) -> bool {
        host.open_ports().any(|p| {
            self.kb.category(p.port, Some(p.label.as_str())) == Some(ServiceCategory::Backdoor)
        })
    }
}

impl Comparator<HostRecord> for InventoryDetector {
    fn compare(&self, previous: &HostRecord, current: &HostRecord) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        changes.extend(FieldChange::between(
            "mac",
            previous.mac.as_ref(),
            current.mac.as_ref(),
        ));
        changes.extend(FieldChange::between(
            "hostname",
            previous.hostname.as_ref(),
            current.hostname.as_ref(),
        ));
        changes.extend(FieldChange::between(
            "vendor",
            previous.vendor.as_ref(),
            current.vendor.as_ref(),
        ));
        if previous.open_port_set() != current.open_port_set() {
            changes.push(FieldChange::new(
                "open_ports",
                Some(render_ports(previous)),
                Some(render_ports(current)),
            ));
        }
        changes
    }

    fn describe(&self, host: &HostRecord) -> Option<String> {
        let mut parts = vec![host.address.to_string()];
        if let Some(name) = &host.hostname {
            parts.push(name.clone());
        }
        if let Some(mac) = &host.mac {
            parts.push(mac.clone());
        }
        Some(parts.join(" "))
    }
}

impl SeverityPolicy<HostRecord> for InventoryDetector {
    fn appeared(&self, _key: &str, host: &HostRecord) -> Severity {
        if !host.known && self.exposes_backdoor(host) {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    fn disappeared(&self, _key: &str, host: &HostRecord) -> Severity {
        if host.known {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    fn changed(
        &self,
        _key: &str,
        _previous: &HostRecord,
        _current: &HostRecord,
        change: &FieldChange,
    ) -> Severity {
        match change.field.as_str() {
            // One hardware address replaced by another on the same IP.
            "mac" if change.previous.is_some() && change.current.is_some() => Severity::High,
            "mac" => Severity::Low,
            "hostname" | "vendor" => Severity::Low,
            _ => Severity::Medium,
        }
    }
}
