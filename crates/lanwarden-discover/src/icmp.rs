//! ICMP echo framing.

pub const ECHO_REQUEST: u8 = 8;
pub const ECHO_REPLY: u8 = 0;
pub const HEADER_LEN: usize = 8;
pub const PAYLOAD_LEN: usize = 32;

/// Internet checksum: one's complement of the one's-complement sum of all
/// 16-bit big-endian words. An odd trailing byte is padded with zero.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = 0u32;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([chunk[0], chunk[1]]) as u32);
    }
    if let Some(&b) = chunks.remainder().first() {
        sum = sum.wrapping_add((b as u32) << 8);
    }
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Echo Request with a 32-byte payload.
pub fn echo_request(ident: u16, seq: u16) -> [u8; HEADER_LEN + PAYLOAD_LEN] {
    let mut packet = [0u8; HEADER_LEN + PAYLOAD_LEN];
    packet[0] = ECHO_REQUEST;
    packet[1] = 0; // code
    packet[4..6].copy_from_slice(&ident.to_be_bytes());
    packet[6..8].copy_from_slice(&seq.to_be_bytes());
    for (i, byte) in packet[HEADER_LEN..].iter_mut().enumerate() {
        *byte = b'a' + (i % 26) as u8;
    }
    let csum = checksum(&packet);
    packet[2..4].copy_from_slice(&csum.to_be_bytes());
    packet
}

/// Identifier for this process's probes.
pub fn process_ident() -> u16 {
    (std::process::id() & 0xFFFF) as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub ident: u16,
    pub seq: u16,
}

/// Parse an Echo Reply. Raw sockets deliver the IPv4 header in front of
/// the ICMP message; datagram sockets do not. Anything that is not a
/// type-0 message with a full 8-byte header is rejected.
pub fn parse_reply(buf: &[u8]) -> Option<EchoReply> {
    let icmp = strip_ipv4_header(buf)?;
    if icmp.len() < HEADER_LEN || icmp[0] != ECHO_REPLY {
        return None;
    }
    Some(EchoReply {
        ident: u16::from_be_bytes([icmp[4], icmp[5]]),
        seq: u16::from_be_bytes([icmp[6], icmp[7]]),
    })
}

fn strip_ipv4_header(buf: &[u8]) -> Option<&[u8]> {
    let first = *buf.first()?;
    // Version nibble 4 can't be an ICMP type byte we accept (0).
    if first >> 4 != 4 {
        return Some(buf);
    }
    let ihl = ((first & 0x0F) as usize) * 4;
    if ihl < 20 || buf.len() < ihl {
        return None;
    }
    Some(&buf[ihl..])
}
