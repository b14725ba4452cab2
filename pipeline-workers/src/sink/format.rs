//! The sink format modes (§4.E): `text`, `json`, `flat-json`, `jinja`,
//! `pcap`. Each renders one [`DnsRecord`] to bytes; batching and
//! rotation live in the sink modules that use this.

use std::str::FromStr;

use pipeline_record::{render, DnsRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Text,
    Json,
    FlatJson,
    Jinja,
    Pcap,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown sink mode {0:?}")]
pub struct UnknownModeError(String);

impl FromStr for SinkMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(SinkMode::Text),
            "json" => Ok(SinkMode::Json),
            "flat-json" => Ok(SinkMode::FlatJson),
            "jinja" => Ok(SinkMode::Jinja),
            "pcap" => Ok(SinkMode::Pcap),
            other => Err(UnknownModeError(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("json encode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("template error: {0}")]
    Render(#[from] render::RenderError),
    #[error("pcap frame error: {0}")]
    Frame(#[from] pipeline_record::FrameError),
}

/// Renders one record in `mode`, appending a trailing newline for the
/// line-oriented modes (`text`/`json`/`flat-json`/`jinja`). `pcap`
/// returns the raw synthetic frame bytes; the caller wraps those in a
/// `PcapPacket` rather than writing them as a text line.
pub fn encode_one(
    record: &DnsRecord,
    mode: SinkMode,
    text_format: &[&str],
    delimiter: &str,
    template: Option<&str>,
) -> Result<Vec<u8>, EncodeError> {
    match mode {
        SinkMode::Text => {
            let mut buf = String::new();
            render::to_text_line(record, text_format, delimiter, &mut buf);
            buf.push('\n');
            Ok(buf.into_bytes())
        }
        SinkMode::Json => {
            let mut bytes = render::to_json(record)?;
            bytes.push(b'\n');
            Ok(bytes)
        }
        SinkMode::FlatJson => {
            let flat = render::flatten(record)?;
            let mut bytes = serde_json::to_vec(&flat)?;
            bytes.push(b'\n');
            Ok(bytes)
        }
        SinkMode::Jinja => {
            let template = template.unwrap_or_default();
            let mut rendered = render::to_template(record, template)?;
            rendered.push('\n');
            Ok(rendered.into_bytes())
        }
        SinkMode::Pcap => Ok(pipeline_record::to_packet_layer(record, None)?),
    }
}
