//! Synthesizes a minimal Ethernet/IP/UDP frame around a record's raw DNS
//! payload, for PCAP-writing sinks.

use etherparse::{Ethernet2Header, Ipv4Header, PacketBuilder};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::enums::Family;
use crate::record::DnsRecord;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("record has no DNS payload to encode")]
    NoPayload,
    #[error("unsupported address family for synthetic frame")]
    UnsupportedFamily,
    #[error("failed to serialize synthetic frame: {0}")]
    Serialize(String),
}

/// Builds a synthetic Ethernet frame carrying `record`'s DNS payload
/// over UDP, swapping source/destination the way a response would be
/// addressed back. `overwrite_port` replaces both UDP ports when set,
/// matching the worked-example sinks' `OverwriteDNSPortPcap` option.
pub fn to_packet_layer(record: &DnsRecord, overwrite_port: Option<u16>) -> Result<Vec<u8>, FrameError> {
    let payload = record.dns.payload.as_ref().ok_or(FrameError::NoPayload)?;

    let src_port = overwrite_port.unwrap_or(record.network.query_port.max(1));
    let dst_port = overwrite_port.unwrap_or(record.network.response_port.max(1));

    let src_ip = record.network.query_ip;
    let dst_ip = record.network.response_ip;

    let mut buf = Vec::with_capacity(Ethernet2Header::LEN + Ipv4Header::MAX_LEN + 8 + payload.len());

    match record.network.family {
        Family::Inet4 => {
            let src = as_v4(src_ip).unwrap_or(Ipv4Addr::UNSPECIFIED);
            let dst = as_v4(dst_ip).unwrap_or(Ipv4Addr::UNSPECIFIED);

            let builder = PacketBuilder::ethernet2([0u8; 6], [0u8; 6])
                .ipv4(src.octets(), dst.octets(), 64)
                .udp(src_port, dst_port);

            builder
                .write(&mut buf, payload)
                .map_err(|e| FrameError::Serialize(e.to_string()))?;
        }
        Family::Inet6 => {
            let src = as_v6(src_ip).unwrap_or(Ipv6Addr::UNSPECIFIED);
            let dst = as_v6(dst_ip).unwrap_or(Ipv6Addr::UNSPECIFIED);

            let builder = PacketBuilder::ethernet2([0u8; 6], [0u8; 6])
                .ipv6(src.octets(), dst.octets(), 64)
                .udp(src_port, dst_port);

            builder
                .write(&mut buf, payload)
                .map_err(|e| FrameError::Serialize(e.to_string()))?;
        }
    }

    Ok(buf)
}

fn as_v4(ip: Option<IpAddr>) -> Option<Ipv4Addr> {
    match ip {
        Some(IpAddr::V4(v4)) => Some(v4),
        _ => None,
    }
}

fn as_v6(ip: Option<IpAddr>) -> Option<Ipv6Addr> {
    match ip {
        Some(IpAddr::V6(v6)) => Some(v6),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_payload_is_an_error() {
        let record = DnsRecord::fake();
        assert_eq!(to_packet_layer(&record, None), Err(FrameError::NoPayload));
    }

    #[test]
    fn dns_collector_payload_round_trips_into_frame_bytes() {
        let mut record = DnsRecord::fake();
        record.dns.payload = Some(bytes::Bytes::from_static(&[
            0xaa, 0xbb, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, b'd',
            b'n', b's', 0x09, b'c', b'o', b'l', b'l', b'e', b'c', b't', b'o', b'r', 0x00, 0x00,
            0x01, 0x00, 0x01,
        ]));
        let frame = to_packet_layer(&record, None).unwrap();
        let haystack = String::from_utf8_lossy(&frame);
        assert!(haystack.contains("dns"));
        assert!(haystack.contains("collector"));
    }
}
