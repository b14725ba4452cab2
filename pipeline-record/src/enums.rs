//! Total lookup functions over the DNS numeric namespaces.
//!
//! Every function here must be defined for the *entire* domain of its
//! input type (`u16` or `u32`) and fall back to `"UNKNOWN"` for values it
//! does not recognize. They are plain `match` expressions rather than
//! enum methods so that malformed/unknown wire values never fail to
//! render — the record model never rejects a record for carrying an
//! rcode or qtype nobody expected.

/// Renders a response code per RFC 1035 / RFC 6895. Total over `u32` even
/// though rcodes only occupy 12 bits on the wire: extended rcodes (EDNS)
/// widen the effective range, and out-of-range values must still resolve
/// to `"UNKNOWN"` rather than panicking.
pub fn rcode_to_string(rcode: u32) -> &'static str {
    match rcode {
        0 => "NOERROR",
        1 => "FORMERR",
        2 => "SERVFAIL",
        3 => "NXDOMAIN",
        4 => "NOTIMP",
        5 => "REFUSED",
        6 => "YXDOMAIN",
        7 => "YXRRSET",
        8 => "NXRRSET",
        9 => "NOTAUTH",
        10 => "NOTZONE",
        11 => "DSOTYPENI",
        16 => "BADSIG",
        17 => "BADKEY",
        18 => "BADTIME",
        19 => "BADMODE",
        20 => "BADNAME",
        21 => "BADALG",
        22 => "BADTRUNC",
        23 => "BADCOOKIE",
        _ => "UNKNOWN",
    }
}

/// Renders a query/resource-record type (`qtype`). Total over `u32`.
pub fn rdatatype_to_string(qtype: u32) -> &'static str {
    match qtype {
        1 => "A",
        2 => "NS",
        5 => "CNAME",
        6 => "SOA",
        12 => "PTR",
        13 => "HINFO",
        15 => "MX",
        16 => "TXT",
        17 => "RP",
        18 => "AFSDB",
        24 => "SIG",
        25 => "KEY",
        28 => "AAAA",
        29 => "LOC",
        33 => "SRV",
        35 => "NAPTR",
        36 => "KX",
        37 => "CERT",
        39 => "DNAME",
        41 => "OPT",
        42 => "APL",
        43 => "DS",
        44 => "SSHFP",
        45 => "IPSECKEY",
        46 => "RRSIG",
        47 => "NSEC",
        48 => "DNSKEY",
        49 => "DHCID",
        50 => "NSEC3",
        51 => "NSEC3PARAM",
        52 => "TLSA",
        53 => "SMIMEA",
        55 => "HIP",
        59 => "CDS",
        60 => "CDNSKEY",
        61 => "OPENPGPKEY",
        64 => "SVCB",
        65 => "HTTPS",
        99 => "SPF",
        249 => "TKEY",
        250 => "TSIG",
        251 => "IXFR",
        252 => "AXFR",
        255 => "ANY",
        257 => "CAA",
        _ => "UNKNOWN",
    }
}

/// Renders a DNS class. Total over `u32`.
pub fn class_to_string(class: u32) -> &'static str {
    match class {
        1 => "IN",
        2 => "CS",
        3 => "CH",
        4 => "HS",
        254 => "NONE",
        255 => "ANY",
        _ => "UNKNOWN",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Family {
    #[default]
    Inet4,
    Inet6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

/// DNSTap interaction kind. Unrecognized operations round-trip as
/// `Other` rather than being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DnstapOperation {
    #[default]
    ClientQuery,
    ClientResponse,
    ResolverQuery,
    ResolverResponse,
    AuthQuery,
    AuthResponse,
    ForwarderQuery,
    ForwarderResponse,
    ToolQuery,
    ToolResponse,
    UpdateQuery,
    UpdateResponse,
    Other(String),
}

impl std::fmt::Display for DnstapOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DnstapOperation::ClientQuery => "CLIENT_QUERY",
            DnstapOperation::ClientResponse => "CLIENT_RESPONSE",
            DnstapOperation::ResolverQuery => "RESOLVER_QUERY",
            DnstapOperation::ResolverResponse => "RESOLVER_RESPONSE",
            DnstapOperation::AuthQuery => "AUTH_QUERY",
            DnstapOperation::AuthResponse => "AUTH_RESPONSE",
            DnstapOperation::ForwarderQuery => "FORWARDER_QUERY",
            DnstapOperation::ForwarderResponse => "FORWARDER_RESPONSE",
            DnstapOperation::ToolQuery => "TOOL_QUERY",
            DnstapOperation::ToolResponse => "TOOL_RESPONSE",
            DnstapOperation::UpdateQuery => "UPDATE_QUERY",
            DnstapOperation::UpdateResponse => "UPDATE_RESPONSE",
            DnstapOperation::Other(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn rcode_is_total(n in any::<u32>()) {
            let s = rcode_to_string(n);
            prop_assert!(!s.is_empty());
        }

        #[test]
        fn rdatatype_is_total(n in any::<u32>()) {
            let s = rdatatype_to_string(n);
            prop_assert!(!s.is_empty());
        }

        #[test]
        fn class_is_total(n in any::<u32>()) {
            let s = class_to_string(n);
            prop_assert!(!s.is_empty());
        }
    }

    #[test]
    fn known_rcodes() {
        assert_eq!(rcode_to_string(0), "NOERROR");
        assert_eq!(rcode_to_string(3), "NXDOMAIN");
    }

    #[test]
    fn unknown_rcode_is_unknown() {
        assert_eq!(rcode_to_string(100_000), "UNKNOWN");
    }
}
