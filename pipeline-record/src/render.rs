//! Purely-functional renderings of a [`DnsRecord`] into the output
//! formats a sink worker writes to its external medium.

use std::fmt::Write as _;

use serde_json::{Map, Value};

use crate::record::DnsRecord;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(String),
    #[error("json encode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Renders `format` (a whitespace-separated list of field tokens) into
/// `buf`, separated by `delimiter`. Unknown tokens render as `-` rather
/// than aborting the line — one bad token must not drop an otherwise
/// valid record.
pub fn to_text_line(record: &DnsRecord, format: &[&str], delimiter: &str, buf: &mut String) {
    for (i, token) in format.iter().enumerate() {
        if i > 0 {
            buf.push_str(delimiter);
        }
        let _ = write!(buf, "{}", field_token(record, token));
    }
}

fn field_token(record: &DnsRecord, token: &str) -> String {
    match token {
        "qname" => record.dns.qname.clone(),
        "qtype" => record.dns.qtype_name().to_string(),
        "qclass" => record.dns.qclass_name().to_string(),
        "rcode" => record.dns.rcode_name().to_string(),
        "qr" => if record.dns.qr { "1b" } else { "0b" }.to_string(),
        "identity" => record.dnstap.identity.clone(),
        "operation" => record.dnstap.operation.0.to_string(),
        "size" => record
            .dns
            .payload
            .as_ref()
            .map(|p| p.len())
            .unwrap_or(0)
            .to_string(),
        "query-ip" => record
            .network
            .query_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "-".to_string()),
        "response-ip" => record
            .network
            .response_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "-".to_string()),
        "family" => record.network.family.to_string(),
        "protocol" => record.network.protocol.to_string(),
        _ => "-".to_string(),
    }
}

/// Serializes the full record as nested JSON.
pub fn to_json(record: &DnsRecord) -> Result<Vec<u8>, RenderError> {
    Ok(serde_json::to_vec(record)?)
}

/// Flattens the record into dot-path keys (`dns.qname`, `network.query-ip`).
pub fn flatten(record: &DnsRecord) -> Result<Map<String, Value>, RenderError> {
    let value = serde_json::to_value(record)?;
    let mut out = Map::new();
    flatten_into("", &value, &mut out);
    Ok(out)
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Map<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                let dotted = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&dotted, v, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

/// Renders the record through an externally supplied text template.
///
/// Templates reference the flattened field map under `rec`, e.g.
/// `{{ rec["dns.qname"] }}`, so a transform never needs to expose its
/// internal struct layout to the template author.
pub fn to_template(record: &DnsRecord, template_src: &str) -> Result<String, RenderError> {
    let env = minijinja::Environment::new();
    let tmpl = env
        .template_from_str(template_src)
        .map_err(|e| RenderError::Template(e.to_string()))?;
    let flat = flatten(record)?;
    let mut ctx = Map::new();
    ctx.insert("rec".to_string(), Value::Object(flat));
    tmpl.render(Value::Object(ctx))
        .map_err(|e| RenderError::Template(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_line_matches_scenario_a() {
        let record = DnsRecord::fake();
        let mut buf = String::new();
        to_text_line(&record, &["qr", "identity", "qtype"], " ", &mut buf);
        assert_eq!(buf, "0b dns.collector A");
    }

    #[test]
    fn json_contains_qname() {
        let record = DnsRecord::fake();
        let json = to_json(&record).unwrap();
        let s = String::from_utf8(json).unwrap();
        assert!(s.contains("\"qname\":\"dns.collector\""));
    }

    #[test]
    fn flat_json_uses_dot_paths() {
        let record = DnsRecord::fake();
        let flat = flatten(&record).unwrap();
        assert!(flat.contains_key("dns.qname"));
        assert_eq!(flat["dns.qname"], Value::String("dns.collector".into()));
    }

    #[test]
    fn unknown_token_renders_placeholder() {
        let record = DnsRecord::fake();
        let mut buf = String::new();
        to_text_line(&record, &["nonsense-token"], " ", &mut buf);
        assert_eq!(buf, "-");
    }

    #[test]
    fn template_renders_qname() {
        let record = DnsRecord::fake();
        let out = to_template(&record, "name={{ rec[\"dns.qname\"] }}").unwrap();
        assert_eq!(out, "name=dns.collector");
    }
}
