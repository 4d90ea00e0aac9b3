//! Risk scoring for findings, devices, and the whole network.
//!
//! Network score: `100 − clip(100 × weighted / (devices × WORST_CASE_PER_DEVICE), 0, 100)`
//! where `weighted` sums per-severity finding counts times their weight.
//! 100 means nothing found, 0 means every device is at or past the worst case.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use lanwarden_core::types::{Finding, Severity};
use serde::{Deserialize, Serialize};

/// Weighted total at which a single device counts as fully compromised.
pub const WORST_CASE_PER_DEVICE: f64 = 30.0;

/// Weight of one finding at each severity.
pub fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 10.0,
        Severity::High => 5.0,
        Severity::Medium => 2.0,
        Severity::Low => 1.0,
        Severity::Info => 0.0,
    }
}

/// Per-finding risk score on the 0–10 scale.
pub fn finding_risk_score(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 9.5,
        Severity::High => 7.5,
        Severity::Medium => 5.0,
        Severity::Low => 2.5,
        Severity::Info => 0.0,
    }
}

/// Finding counts per severity for one device (or any group of findings).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityBuckets {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityBuckets {
    pub fn add(&mut self, severity: Severity) {
        *self.slot(severity) += 1;
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    fn slot(&mut self, severity: Severity) -> &mut usize {
        match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }

    /// Worst severity with at least one finding.
    pub fn worst(&self) -> Option<Severity> {
        Severity::DESCENDING
            .into_iter()
            .find(|s| self.count(*s) > 0)
    }

    pub fn weighted(&self) -> f64 {
        Severity::DESCENDING
            .into_iter()
            .map(|s| self.count(s) as f64 * severity_weight(s))
            .sum()
    }
}

impl<'a> FromIterator<&'a Finding> for SeverityBuckets {
    fn from_iter<I: IntoIterator<Item = &'a Finding>>(iter: I) -> Self {
        let mut buckets = Self::default();
        for finding in iter {
            buckets.add(finding.severity);
        }
        buckets
    }
}

/// Network-level summary of one classification pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskSummary {
    pub device_count: usize,
    pub totals: SeverityBuckets,
    pub devices: BTreeMap<Ipv4Addr, SeverityBuckets>,
    /// 0–100, higher is safer.
    pub score: f64,
}

impl RiskSummary {
    /// Summarise `findings` over `device_count` devices. Devices without
    /// findings still count toward the denominator.
    pub fn compute(device_count: usize, findings: &[Finding]) -> Self {
        let mut devices: BTreeMap<Ipv4Addr, SeverityBuckets> = BTreeMap::new();
        for finding in findings {
            devices.entry(finding.address).or_default().add(finding.severity);
        }
        let totals: SeverityBuckets = findings.iter().collect();
        let score = network_risk_score(device_count, &totals);
        Self {
            device_count,
            totals,
            devices,
            score,
        }
    }

    /// Worst severity for a device, `None` when it has no findings.
    pub fn device_severity(&self, address: Ipv4Addr) -> Option<Severity> {
        self.devices.get(&address).and_then(|b| b.worst())
    }
}

/// `100 − clip(100 × weighted / (devices × WORST_CASE_PER_DEVICE), 0, 100)`.
/// No devices scores 100.
pub fn network_risk_score(device_count: usize, totals: &SeverityBuckets) -> f64 {
    if device_count == 0 {
        return 100.0;
    }
    let worst_case = device_count as f64 * WORST_CASE_PER_DEVICE;
    let penalty = (100.0 * totals.weighted() / worst_case).clamp(0.0, 100.0);
    100.0 - penalty
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use lanwarden_core::types::{FindingCategory, FindingId};

    use super::*;

    fn finding(last: u8, severity: Severity) -> Finding {
        let address = Ipv4Addr::new(10, 0, 0, last);
        Finding {
            id: FindingId::derive("test", address, None),
            rule_id: "test".to_string(),
            severity,
            category: FindingCategory::Misconfiguration,
            title: String::new(),
            description: String::new(),
            address,
            port: None,
            risk_score: finding_risk_score(severity),
            remediation: String::new(),
            detail: String::new(),
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn no_devices_scores_100() {
        let summary = RiskSummary::compute(0, &[]);
        assert_eq!(summary.score, 100.0);
    }

    #[test]
    fn clean_network_scores_100() {
        let summary = RiskSummary::compute(5, &[finding(1, Severity::Info)]);
        assert_eq!(summary.score, 100.0);
    }

    #[test]
    fn weighted_score() {
        // 2 devices: one critical (10) + one high (5) + one medium (2) = 17.
        // 100 * 17 / 60 = 28.33 → score 71.67
        let findings = vec![
            finding(1, Severity::Critical),
            finding(1, Severity::High),
            finding(2, Severity::Medium),
        ];
        let summary = RiskSummary::compute(2, &findings);
        assert!((summary.score - (100.0 - 1700.0 / 60.0)).abs() < 1e-9);
        assert_eq!(summary.device_severity(Ipv4Addr::new(10, 0, 0, 1)), Some(Severity::Critical));
        assert_eq!(summary.device_severity(Ipv4Addr::new(10, 0, 0, 2)), Some(Severity::Medium));
        assert_eq!(summary.device_severity(Ipv4Addr::new(10, 0, 0, 3)), None);
    }

    #[test]
    fn score_clips_at_zero() {
        let findings: Vec<_> = (0..10).map(|_| finding(1, Severity::Critical)).collect();
        let summary = RiskSummary::compute(1, &findings);
        assert_eq!(summary.score, 0.0);
    }

    #[test]
    fn buckets_worst_and_total() {
        let mut buckets = SeverityBuckets::default();
        assert_eq!(buckets.worst(), None);
        buckets.add(Severity::Low);
        buckets.add(Severity::High);
        buckets.add(Severity::Low);
        assert_eq!(buckets.worst(), Some(Severity::High));
        assert_eq!(buckets.total(), 3);
        assert_eq!(buckets.weighted(), 7.0);
    }

    #[test]
    fn summary_serializes() {
        let summary = RiskSummary::compute(1, &[finding(4, Severity::Low)]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totals"]["low"], 1);
        assert!(json["devices"]["10.0.0.4"].is_object());
    }
}
