//! The stable extension point between captured packets and [`DnsRecord`].
//!
//! Full message decoding (names, resource records, EDNS options) is a
//! collaborator's concern (see module docs); this crate only guarantees
//! the 12-byte header boundary every DNS message shares.

use crate::record::{DnsHeader, DnsRecord, ParseErrorKind};

/// The fixed-size DNS message header, per RFC 1035 §4.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub flags: u16,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

/// Decodes the fixed 12-byte DNS header.
///
/// Fails with [`ParseErrorKind::HeaderTooShort`] for any input shorter
/// than 12 bytes; never panics.
pub fn decode_dns(bytes: &[u8]) -> Result<Header, ParseErrorKind> {
    if bytes.len() < 12 {
        return Err(ParseErrorKind::HeaderTooShort);
    }

    let id = u16::from_be_bytes([bytes[0], bytes[1]]);
    let flags = u16::from_be_bytes([bytes[2], bytes[3]]);
    let qr = flags & 0x8000 != 0;
    let opcode = ((flags >> 11) & 0x0f) as u8;
    let rcode = (flags & 0x0f) as u8;
    let qdcount = u16::from_be_bytes([bytes[4], bytes[5]]);
    let ancount = u16::from_be_bytes([bytes[6], bytes[7]]);
    let nscount = u16::from_be_bytes([bytes[8], bytes[9]]);
    let arcount = u16::from_be_bytes([bytes[10], bytes[11]]);

    Ok(Header {
        id,
        qr,
        opcode,
        flags,
        rcode,
        qdcount,
        ancount,
        nscount,
        arcount,
    })
}

/// Populates the remaining [`DnsRecord`] fields from a previously
/// decoded [`Header`] plus the original payload.
///
/// This is intentionally shallow: it fills in the header-derived fields
/// and leaves qname/qtype/qclass decoding (which requires walking
/// compressed name labels) to the caller's question-section parser, or
/// `None`/`malformed=true` when one isn't available. A source worker
/// that has a full message parser is expected to overwrite `dns.qname`
/// etc. after calling this.
pub fn decode_payload(record: &mut DnsRecord, header: &Header, payload: bytes::Bytes) {
    record.dns.id = header.id;
    record.dns.opcode = header.opcode;
    record.dns.rcode = header.rcode as u32;
    record.dns.qr = header.qr;
    record.dns.flags = header.flags;
    record.dns.payload = Some(payload);
    record.dns.malformed = header.qdcount == 0 && !header.qr;
}

impl DnsHeader {
    pub fn rcode_name(&self) -> &'static str {
        crate::enums::rcode_to_string(self.rcode)
    }

    pub fn qtype_name(&self) -> &'static str {
        crate::enums::rdatatype_to_string(self.qtype)
    }

    pub fn qclass_name(&self) -> &'static str {
        crate::enums::class_to_string(self.qclass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_dns_header_too_short() {
        let bytes = [183, 59];
        let err = decode_dns(&bytes).unwrap_err();
        assert_eq!(err, ParseErrorKind::HeaderTooShort);
    }

    #[test]
    fn decode_dns_header_exact_minimum() {
        let bytes = [0u8; 12];
        let header = decode_dns(&bytes).expect("12 bytes is the minimum valid header");
        assert_eq!(header.id, 0);
        assert!(!header.qr);
    }

    #[test]
    fn decode_dns_real_query() {
        // A query for "example.com" A, hand-packed header only (question
        // section is not required to exercise the header decoder).
        let bytes = [
            0x12, 0x34, // id
            0x01, 0x00, // flags: standard query
            0x00, 0x01, // qdcount
            0x00, 0x00, // ancount
            0x00, 0x00, // nscount
            0x00, 0x00, // arcount
        ];
        let header = decode_dns(&bytes).unwrap();
        assert_eq!(header.id, 0x1234);
        assert!(!header.qr);
        assert_eq!(header.qdcount, 1);
    }
}
