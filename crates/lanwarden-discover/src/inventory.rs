//! The device inventory carried between cycles.
//!
//! Hosts are never removed. A host in the scanned range that stops
//! answering is kept with `alive = false` and its last observed ports.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use lanwarden_core::types::HostRecord;
use serde::{Deserialize, Serialize};

/// Operator-acknowledged devices, matched by address or MAC.
#[derive(Debug, Clone, Default)]
pub struct KnownDevices {
    addresses: HashSet<Ipv4Addr>,
    macs: HashSet<String>,
}

impl KnownDevices {
    /// Entries that parse as IPv4 are addresses; anything else is a MAC.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut known = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match entry.parse::<Ipv4Addr>() {
                Ok(addr) => {
                    known.addresses.insert(addr);
                }
                Err(_) => {
                    known.macs.insert(entry.to_ascii_lowercase());
                }
            }
        }
        known
    }

    pub fn matches(&self, host: &HostRecord) -> bool {
        self.addresses.contains(&host.address)
            || host
                .mac
                .as_deref()
                .is_some_and(|mac| self.macs.contains(&mac.to_ascii_lowercase()))
    }
}

/// Counts from one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub new_hosts: usize,
    pub returning: usize,
    pub went_offline: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Inventory {
    pub hosts: BTreeMap<Ipv4Addr, HostRecord>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Inventory {
    pub fn get(&self, address: Ipv4Addr) -> Option<&HostRecord> {
        self.hosts.get(&address)
    }

    pub fn alive(&self) -> impl Iterator<Item = &HostRecord> {
        self.hosts.values().filter(|h| h.alive)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Fold one cycle's observations into the inventory.
    ///
    /// `observed` are the hosts that answered this cycle; `scanned` is every
    /// address that was probed. Hosts outside `scanned` are left untouched.
    pub fn merge(
        &mut self,
        observed: Vec<HostRecord>,
        scanned: &BTreeSet<Ipv4Addr>,
        now: DateTime<Utc>,
        known: &KnownDevices,
    ) -> MergeSummary {
        let mut summary = MergeSummary::default();
        let mut seen = BTreeSet::new();

        for mut host in observed {
            seen.insert(host.address);
            host.alive = true;
            host.last_seen = now;

            match self.hosts.get(&host.address) {
                Some(existing) => {
                    if !existing.alive {
                        summary.returning += 1;
                    }
                    host.first_seen = existing.first_seen;
                    host.known = existing.known || host.known;
                    if host.mac.is_none() {
                        host.mac = existing.mac.clone();
                    }
                    if host.hostname.is_none() {
                        host.hostname = existing.hostname.clone();
                    }
                    if host.vendor.is_none() {
                        host.vendor = existing.vendor.clone();
                    }
                }
                None => {
                    summary.new_hosts += 1;
                    host.first_seen = now;
                }
            }
            host.known = host.known || known.matches(&host);
            self.hosts.insert(host.address, host);
        }

        for (address, host) in self.hosts.iter_mut() {
            if host.alive && scanned.contains(address) && !seen.contains(address) {
                host.alive = false;
                summary.went_offline += 1;
                tracing::debug!(host = %address, "Host went offline");
            }
        }

        self.updated_at = Some(now);
        summary
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use lanwarden_core::types::PortRecord;

    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, last)
    }

    fn observed(last: u8, now: DateTime<Utc>) -> HostRecord {
        let mut host = HostRecord::discovered(addr(last), now);
        host.ports = vec![PortRecord::open(22, "ssh")];
        host
    }

    fn scanned(range: std::ops::RangeInclusive<u8>) -> BTreeSet<Ipv4Addr> {
        range.map(addr).collect()
    }

    #[test]
    fn first_merge_adds_hosts() {
        let now = Utc::now();
        let mut inv = Inventory::default();
        let summary = inv.merge(
            vec![observed(1, now), observed(2, now)],
            &scanned(1..=254),
            now,
            &KnownDevices::default(),
        );
        assert_eq!(summary.new_hosts, 2);
        assert_eq!(inv.alive().count(), 2);
        assert_eq!(inv.updated_at, Some(now));
    }

    #[test]
    fn first_seen_survives_and_attributes_fall_back() {
        let t0 = Utc::now() - Duration::hours(48);
        let t1 = Utc::now();
        let mut inv = Inventory::default();
        let mut first = observed(5, t0);
        first.mac = Some("aa:bb:cc:00:00:05".to_string());
        first.hostname = Some("nas".to_string());
        inv.merge(vec![first], &scanned(1..=254), t0, &KnownDevices::default());

        inv.merge(vec![observed(5, t1)], &scanned(1..=254), t1, &KnownDevices::default());
        let host = inv.get(addr(5)).unwrap();
        assert_eq!(host.first_seen, t0);
        assert_eq!(host.last_seen, t1);
        assert_eq!(host.mac.as_deref(), Some("aa:bb:cc:00:00:05"));
        assert_eq!(host.hostname.as_deref(), Some("nas"));
    }

    #[test]
    fn silent_hosts_go_offline_only_inside_scanned_range() {
        let now = Utc::now();
        let mut inv = Inventory::default();
        inv.merge(
            vec![observed(1, now), observed(2, now)],
            &scanned(1..=2),
            now,
            &KnownDevices::default(),
        );

        // Second cycle only covers .1 and .3.
        let later = now + Duration::minutes(5);
        let summary = inv.merge(
            vec![],
            &[addr(1), addr(3)].into_iter().collect(),
            later,
            &KnownDevices::default(),
        );
        assert_eq!(summary.went_offline, 1);
        assert!(!inv.get(addr(1)).unwrap().alive);
        assert!(inv.get(addr(2)).unwrap().alive);
        assert_eq!(inv.len(), 2, "hosts are never removed");

        let summary = inv.merge(vec![observed(1, later)], &scanned(1..=1), later, &KnownDevices::default());
        assert_eq!(summary.returning, 1);
    }

    #[test]
    fn known_by_address_or_mac_and_sticky() {
        let now = Utc::now();
        let known = KnownDevices::from_entries(["192.168.1.1", "AA:BB:CC:DD:EE:FF", " "]);
        let mut by_mac = observed(7, now);
        by_mac.mac = Some("aa:bb:cc:dd:ee:ff".to_string());

        let mut inv = Inventory::default();
        inv.merge(vec![observed(1, now), by_mac, observed(9, now)], &scanned(1..=9), now, &known);
        assert!(inv.get(addr(1)).unwrap().known);
        assert!(inv.get(addr(7)).unwrap().known);
        assert!(!inv.get(addr(9)).unwrap().known);

        // Dropping the entry from config does not un-know a device.
        inv.merge(vec![observed(1, now)], &scanned(1..=1), now, &KnownDevices::default());
        assert!(inv.get(addr(1)).unwrap().known);
    }
}
