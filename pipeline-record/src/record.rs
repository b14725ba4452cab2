use std::collections::HashMap;
use std::net::IpAddr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::enums::{DnstapOperation, Family, Protocol};

/// A decoded DNS header, as carried on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsHeader {
    pub id: u16,
    pub opcode: u8,
    pub rcode: u32,
    pub qtype: u32,
    pub qclass: u32,
    pub qname: String,
    /// Raw wire bytes. `None` for collectors that never see the payload
    /// (e.g. a source fed purely structured data). Immutable once set —
    /// see [`DnsRecord`] invariant 2.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Bytes>,
    pub qr: bool,
    pub flags: u16,
    pub malformed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<ParseErrorKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ParseErrorKind {
    #[error("DNS header too short")]
    HeaderTooShort,
    #[error("DNS payload malformed")]
    PayloadMalformed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsTapMeta {
    pub identity: String,
    pub operation: DnstapOperationSerde,
    pub time_sec: u64,
    pub time_nsec: u32,
}

/// `strum`'s `Display`/`EnumString` don't cover the free-form `Other`
/// variant cleanly for serde, so `DnsTapMeta` carries a thin serde
/// wrapper around [`DnstapOperation`] instead of deriving directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnstapOperationSerde(pub DnstapOperation);

impl Serialize for DnstapOperationSerde {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for DnstapOperationSerde {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self(match s.as_str() {
            "CLIENT_QUERY" => DnstapOperation::ClientQuery,
            "CLIENT_RESPONSE" => DnstapOperation::ClientResponse,
            "RESOLVER_QUERY" => DnstapOperation::ResolverQuery,
            "RESOLVER_RESPONSE" => DnstapOperation::ResolverResponse,
            "AUTH_QUERY" => DnstapOperation::AuthQuery,
            "AUTH_RESPONSE" => DnstapOperation::AuthResponse,
            "FORWARDER_QUERY" => DnstapOperation::ForwarderQuery,
            "FORWARDER_RESPONSE" => DnstapOperation::ForwarderResponse,
            "TOOL_QUERY" => DnstapOperation::ToolQuery,
            "TOOL_RESPONSE" => DnstapOperation::ToolResponse,
            "UPDATE_QUERY" => DnstapOperation::UpdateQuery,
            "UPDATE_RESPONSE" => DnstapOperation::UpdateResponse,
            other => DnstapOperation::Other(other.to_string()),
        }))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub family: Family,
    pub protocol: Protocol,
    pub query_ip: Option<IpAddr>,
    pub query_port: u16,
    pub response_ip: Option<IpAddr>,
    pub response_port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdnsOptions {
    pub udp_size: u16,
    pub options: Vec<(u16, Bytes)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Geo {
    pub continent: Option<String>,
    pub country_iso_code: Option<String>,
    pub city: Option<String>,
    pub as_number: Option<u32>,
    pub as_owner: Option<String>,
}

/// Free-form tags attached by transforms (e.g. a normalization or
/// filtering transform stamping a classification on the record).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ATags(pub Vec<String>);

/// Aggregation scratch state populated by a reducer-style transform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reducer {
    pub count: u64,
    pub cumulative_length: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicSuffix {
    pub tld: Option<String>,
    pub etld_plus_one: Option<String>,
}

/// Scratch space transforms use to stash intermediate results without
/// widening [`DnsRecord`] itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extracted(pub HashMap<String, String>);

/// The canonical in-pipeline observation unit.
///
/// A record is owned by exactly one worker at any instant; sending it
/// across a channel transfers ownership (invariant 1). `payload` is
/// wrapped in [`Bytes`] so that fan-out to multiple forward peers is a
/// cheap refcount bump rather than a deep copy, while still presenting
/// by-value semantics — nothing may mutate the bytes behind an existing
/// clone (invariant 2); a transform that needs to rewrite the payload
/// must build a new `Bytes` and replace the field wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsRecord {
    pub dns: DnsHeader,
    pub dnstap: DnsTapMeta,
    pub network: NetworkInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edns: Option<EdnsOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<Geo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a_tags: Option<ATags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reducer: Option<Reducer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_suffix: Option<PublicSuffix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<Extracted>,
}

impl DnsRecord {
    /// Builds a minimal, valid record for tests and synthetic sources.
    pub fn fake() -> Self {
        let mut record = DnsRecord {
            dns: DnsHeader {
                qname: "dns.collector".to_string(),
                qtype: 1, // A
                qclass: 1,
                ..Default::default()
            },
            dnstap: DnsTapMeta {
                identity: "dns.collector".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        record.network.family = Family::Inet4;
        record.network.protocol = Protocol::Udp;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_record_has_expected_fields() {
        let record = DnsRecord::fake();
        assert_eq!(record.dns.qname, "dns.collector");
        assert_eq!(record.dnstap.identity, "dns.collector");
    }

    #[test]
    fn clone_shares_payload_bytes() {
        let mut record = DnsRecord::fake();
        record.dns.payload = Some(Bytes::from_static(b"abc"));
        let clone = record.clone();
        assert_eq!(
            record.dns.payload.as_ref().unwrap().as_ptr(),
            clone.dns.payload.as_ref().unwrap().as_ptr()
        );
    }
}
