//! Target enumeration: subnet expression to host addresses.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::{DiscoverError, Result};

/// Shortest prefix accepted. A /16 is already 65k probes.
pub const MIN_PREFIX: u8 = 16;

/// Parse `192.168.1.0/24`, `192.168.1`, `192.168.1.`, or a single address.
///
/// Host bits in CIDR input are cleared (`10.0.0.7/24` is `10.0.0.0/24`).
pub fn parse_target(target: &str) -> Result<Ipv4Net> {
    let raw = target.trim();
    let invalid = |reason: &str| DiscoverError::InvalidTarget {
        target: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.is_empty() {
        return Err(invalid("empty target"));
    }
    if raw.contains(':') {
        return Err(invalid("IPv6 targets are not supported"));
    }

    let net = if raw.contains('/') {
        raw.parse::<Ipv4Net>()
            .map_err(|_| invalid("not a valid IPv4 CIDR"))?
            .trunc()
    } else {
        let trimmed = raw.trim_end_matches('.');
        let octets = trimmed.split('.').count();
        match octets {
            3 => format!("{trimmed}.0/24")
                .parse::<Ipv4Net>()
                .map_err(|_| invalid("not a valid three-octet prefix"))?,
            4 => {
                let addr: Ipv4Addr = trimmed
                    .parse()
                    .map_err(|_| invalid("not a valid IPv4 address"))?;
                Ipv4Net::from(addr)
            }
            _ => return Err(invalid("expected CIDR or a three-octet prefix")),
        }
    };

    if net.prefix_len() < MIN_PREFIX {
        return Err(DiscoverError::TooLarge {
            target: raw.to_string(),
            prefix: net.prefix_len(),
            min: MIN_PREFIX,
        });
    }
    Ok(net)
}

/// Usable host addresses of `target`, ascending. Network and broadcast
/// addresses are excluded for prefixes shorter than /31.
pub fn enumerate_targets(target: &str) -> Result<Vec<Ipv4Addr>> {
    let net = parse_target(target)?;
    let hosts: Vec<Ipv4Addr> = net.hosts().collect();
    tracing::debug!(target = %net, hosts = hosts.len(), "Targets enumerated");
    Ok(hosts)
}
