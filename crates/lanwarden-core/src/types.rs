//! Core domain types shared by the discovery, classification, and diff crates.
//!
//! A scan cycle produces `HostRecord`s (each owning its `PortRecord`s),
//! classification turns a host into `Finding`s, and the diff engine turns two
//! snapshots into `ChangeEvent`s.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

// ── Identifiers ───────────────────────────────────────────────────

/// Unique identifier for one scan cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ScanId(pub Uuid);

impl ScanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Namespace for deterministic finding IDs.
const FINDING_NS: Uuid = Uuid::from_bytes([
    0x3f, 0x1c, 0x52, 0x8e, 0x7a, 0x04, 0x4b, 0x61, 0x9d, 0x2e, 0x11, 0xa8, 0x60, 0xc3, 0x5b, 0x47,
]);

/// Identifier of a finding. Derived from rule, host, and port so that
/// re-classifying an unchanged host yields the same IDs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FindingId(pub Uuid);

impl FindingId {
    pub fn derive(rule_id: &str, address: Ipv4Addr, port: Option<u16>) -> Self {
        let port = port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        Self(Uuid::new_v5(
            &FINDING_NS,
            format!("{rule_id}:{address}:{port}").as_bytes(),
        ))
    }
}

// ── Severity ──────────────────────────────────────────────────────

/// Ordered rank shared by findings and change events.
///
/// Declared lowest-first so the derived `Ord` gives `Critical > High > ... > Info`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, worst first.
    pub const DESCENDING: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Hosts and ports ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Udp,
}

/// Port state as observed by a connect probe. Refusal and silent drop are
/// the same state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Open,
    ClosedFiltered,
}

/// One probed port on a host. Recreated on every scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRecord {
    pub port: u16,
    pub transport: Transport,
    pub state: PortState,
    /// Service label, coarse from the scanner and refined by the knowledge base.
    pub label: String,
    pub banner: Option<String>,
}

impl PortRecord {
    pub fn open(port: u16, label: impl Into<String>) -> Self {
        Self {
            port,
            transport: Transport::Tcp,
            state: PortState::Open,
            label: label.into(),
            banner: None,
        }
    }

    pub fn closed(port: u16, label: impl Into<String>) -> Self {
        Self {
            port,
            transport: Transport::Tcp,
            state: PortState::ClosedFiltered,
            label: label.into(),
            banner: None,
        }
    }

    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.state == PortState::Open
    }
}

/// A device seen on the network. Never hard-deleted: hosts that stop
/// answering are kept with `alive = false`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostRecord {
    pub address: Ipv4Addr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    #[serde(default)]
    pub ports: Vec<PortRecord>,
    pub alive: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Set by the operator once a device has been acknowledged.
    #[serde(default)]
    pub known: bool,
}

impl HostRecord {
    /// A host seen for the first time at `now`.
    pub fn discovered(address: Ipv4Addr, now: DateTime<Utc>) -> Self {
        Self {
            address,
            mac: None,
            hostname: None,
            vendor: None,
            ports: Vec::new(),
            alive: true,
            first_seen: now,
            last_seen: now,
            known: false,
        }
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.ports.iter().filter(|p| p.is_open())
    }

    /// Open port numbers, used for membership comparison between scans.
    pub fn open_port_set(&self) -> BTreeSet<u16> {
        self.open_ports().map(|p| p.port).collect()
    }

    pub fn has_open(&self, port: u16) -> bool {
        self.ports.iter().any(|p| p.port == port && p.is_open())
    }

    pub fn port(&self, port: u16) -> Option<&PortRecord> {
        self.ports.iter().find(|p| p.port == port)
    }
}

// ── Findings ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    Backdoor,
    ExposedService,
    WeakSecurity,
    Misconfiguration,
    RogueDevice,
    SuspiciousActivity,
    DataExposure,
    DosRisk,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::Backdoor => "backdoor",
            FindingCategory::ExposedService => "exposed-service",
            FindingCategory::WeakSecurity => "weak-security",
            FindingCategory::Misconfiguration => "misconfiguration",
            FindingCategory::RogueDevice => "rogue-device",
            FindingCategory::SuspiciousActivity => "suspicious-activity",
            FindingCategory::DataExposure => "data-exposure",
            FindingCategory::DosRisk => "dos-risk",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified security observation tied to a host and optionally a port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub id: FindingId,
    /// Rule that produced this finding.
    pub rule_id: String,
    pub severity: Severity,
    pub category: FindingCategory,
    pub title: String,
    pub description: String,
    pub address: Ipv4Addr,
    pub port: Option<u16>,
    /// 0.0 – 10.0.
    pub risk_score: f64,
    pub remediation: String,
    pub detail: String,
    pub detected_at: DateTime<Utc>,
}

// ── Service fingerprints ──────────────────────────────────────────

/// A service observed at `address:port`, tracked across cycles.
///
/// `authorized` belongs to the `address:port` key, not to the service being
/// online, so it survives the service disappearing and coming back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceFingerprint {
    pub address: Ipv4Addr,
    pub port: u16,
    pub service_type: String,
    pub version: Option<String>,
    pub authorized: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ServiceFingerprint {
    pub fn key(&self) -> String {
        service_key(self.address, self.port)
    }
}

/// Canonical `address:port` key.
pub fn service_key(address: Ipv4Addr, port: u16) -> String {
    format!("{address}:{port}")
}

/// Parse an `address:port` key, normalising it in the process.
pub fn parse_service_key(key: &str) -> Result<(Ipv4Addr, u16)> {
    let invalid = || CoreError::InvalidServiceKey(key.to_string());
    let (addr, port) = key.trim().rsplit_once(':').ok_or_else(invalid)?;
    let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }
    Ok((addr, port))
}

// ── Change events ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Appeared,
    Disappeared,
    AttributeChanged,
}

/// One detected difference between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Which detector produced the event ("inventory", "ai-services", ...).
    pub detector: String,
    pub subject: String,
    /// Attribute name for `AttributeChanged` events.
    pub field: Option<String>,
    pub previous: Option<String>,
    pub current: Option<String>,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_critical_first() {
        let mut levels = vec![
            Severity::Low,
            Severity::Critical,
            Severity::Info,
            Severity::High,
            Severity::Medium,
        ];
        levels.sort_by(|a, b| b.cmp(a));
        assert_eq!(levels, Severity::DESCENDING.to_vec());
    }

    #[test]
    fn severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }

    #[test]
    fn category_serializes_kebab() {
        let json = serde_json::to_string(&FindingCategory::DataExposure).unwrap();
        assert_eq!(json, "\"data-exposure\"");
        assert_eq!(FindingCategory::DosRisk.to_string(), "dos-risk");
    }

    #[test]
    fn finding_id_is_deterministic() {
        let ip = Ipv4Addr::new(10, 0, 0, 5);
        assert_eq!(
            FindingId::derive("telnet-exposed", ip, Some(23)),
            FindingId::derive("telnet-exposed", ip, Some(23))
        );
        assert_ne!(
            FindingId::derive("telnet-exposed", ip, Some(23)),
            FindingId::derive("telnet-exposed", ip, None)
        );
    }

    #[test]
    fn open_port_set_ignores_closed() {
        let mut host = HostRecord::discovered(Ipv4Addr::new(10, 0, 0, 1), Utc::now());
        host.ports = vec![
            PortRecord::open(22, "ssh"),
            PortRecord::closed(23, "telnet"),
            PortRecord::open(80, "http"),
        ];
        assert_eq!(host.open_port_set().into_iter().collect::<Vec<_>>(), vec![22, 80]);
        assert!(host.has_open(22));
        assert!(!host.has_open(23));
    }

    #[test]
    fn service_key_parses_and_rejects() {
        let (addr, port) = parse_service_key(" 10.0.0.9:11434 ").unwrap();
        assert_eq!(service_key(addr, port), "10.0.0.9:11434");
        assert!(parse_service_key("10.0.0.9").is_err());
        assert!(parse_service_key("10.0.0.9:0").is_err());
        assert!(parse_service_key("host:80").is_err());
    }

    #[test]
    fn host_record_roundtrip() {
        let mut host = HostRecord::discovered(Ipv4Addr::new(192, 168, 1, 7), Utc::now());
        host.mac = Some("AA:BB:CC:DD:EE:FF".to_string());
        host.ports.push(PortRecord::open(443, "https").with_banner("nginx"));

        let json = serde_json::to_string(&host).unwrap();
        let back: HostRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(host, back);
    }
}
