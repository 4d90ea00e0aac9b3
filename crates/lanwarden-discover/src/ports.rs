//! Port lists for each scan tier.

use std::collections::BTreeSet;

use lanwarden_core::services::{ServiceCategory, AI_INFERENCE, HOME_AUTOMATION, WELL_KNOWN};

use crate::config::ScanTier;
use crate::error::{DiscoverError, Result};

pub const QUICK_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 139, 143, 443, 445, 1433, 3306, 3389, 5432, 5900, 6379, 8080,
    8443, 11434,
];

impl ScanTier {
    /// Ports to probe, ascending and without duplicates. `custom` is only
    /// used by `ScanTier::Custom`.
    pub fn ports(&self, custom: &[u16]) -> Vec<u16> {
        let set: BTreeSet<u16> = match self {
            ScanTier::Quick => QUICK_PORTS.iter().copied().collect(),
            ScanTier::Standard => knowledge_base_ports().collect(),
            ScanTier::Full => (1..=1024).chain(knowledge_base_ports()).collect(),
            ScanTier::Backdoors => WELL_KNOWN
                .ports()
                .filter(|p| {
                    WELL_KNOWN.get(*p).map(|s| s.category) == Some(ServiceCategory::Backdoor)
                })
                .collect(),
            ScanTier::HomeAutomation => HOME_AUTOMATION.ports().collect(),
            ScanTier::AiServices => AI_INFERENCE.ports().collect(),
            ScanTier::Custom => custom.iter().copied().filter(|p| *p != 0).collect(),
        };
        set.into_iter().collect()
    }
}

fn knowledge_base_ports() -> impl Iterator<Item = u16> {
    HOME_AUTOMATION
        .ports()
        .chain(AI_INFERENCE.ports())
        .chain(WELL_KNOWN.ports())
}

/// Parse `22,80,8000-8010` into a sorted, de-duplicated list.
pub fn parse_port_list(raw: &str) -> Result<Vec<u16>> {
    let invalid = |msg: String| DiscoverError::InvalidPorts(msg);
    let mut ports = BTreeSet::new();

    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: u16 = start
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("bad range start in {part:?}")))?;
                let end: u16 = end
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("bad range end in {part:?}")))?;
                if start == 0 || start > end {
                    return Err(invalid(format!("bad range {part:?}")));
                }
                ports.extend(start..=end);
            }
            None => {
                let port: u16 = part
                    .parse()
                    .map_err(|_| invalid(format!("bad port {part:?}")))?;
                if port == 0 {
                    return Err(invalid("port 0 is not scannable".to_string()));
                }
                ports.insert(port);
            }
        }
    }

    if ports.is_empty() {
        return Err(invalid("no ports given".to_string()));
    }
    Ok(ports.into_iter().collect())
}
