//! IPv4 header summary for observability.
//!
//! The engine logs the source, destination, protocol, and total length of
//! captured packets. Nothing here influences forwarding; packets that
//! cannot be summarized are forwarded all the same.

use std::fmt;
use std::net::Ipv4Addr;

/// Minimum IPv4 header length in bytes.
const MIN_IPV4_HEADER: usize = 20;

/// Interpreted fields of an IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpSummary {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub total_length: u16,
}

/// Summarize the IPv4 header of a raw packet.
///
/// Returns `None` for non-IPv4 packets or buffers shorter than a minimal
/// IPv4 header.
pub fn summarize(packet: &[u8]) -> Option<IpSummary> {
    if packet.len() < MIN_IPV4_HEADER {
        return None;
    }
    if packet[0] >> 4 != 4 {
        return None;
    }

    Some(IpSummary {
        source: Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]),
        destination: Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]),
        protocol: packet[9],
        total_length: u16::from_be_bytes([packet[2], packet[3]]),
    })
}

impl fmt::Display for IpSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}, protocol {}, {} bytes",
            self.source, self.destination, self.protocol, self.total_length
        )
    }
}
