//! Link-layer addresses from the kernel neighbour cache.
//!
//! A successful echo exchange leaves an ARP entry behind, so reading
//! `/proc/net/arp` after the sweep yields MACs for most live hosts on the
//! local segment. Hosts behind a router never get one.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;

pub const ARP_TABLE: &str = "/proc/net/arp";

/// ATF_COM: the entry is complete.
const FLAG_COMPLETE: u32 = 0x2;

/// Read the ARP cache. Missing or unreadable tables yield an empty map.
pub fn read_arp_cache(path: impl AsRef<Path>) -> HashMap<Ipv4Addr, String> {
    match std::fs::read_to_string(path.as_ref()) {
        Ok(text) => parse_arp_table(&text),
        Err(e) => {
            tracing::debug!(path = %path.as_ref().display(), error = %e, "ARP cache unavailable");
            HashMap::new()
        }
    }
}

/// Parse the `/proc/net/arp` text format:
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0
/// ```
///
/// Incomplete entries and all-zero MACs are dropped. MACs are lowercased.
pub fn parse_arp_table(text: &str) -> HashMap<Ipv4Addr, String> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let ip: Ipv4Addr = cols.next()?.parse().ok()?;
            let _hw_type = cols.next()?;
            let flags = u32::from_str_radix(cols.next()?.trim_start_matches("0x"), 16).ok()?;
            let mac = cols.next()?.to_ascii_lowercase();
            if flags & FLAG_COMPLETE == 0 || mac == "00:00:00:00:00:00" {
                return None;
            }
            Some((ip, mac))
        })
        .collect()
}
