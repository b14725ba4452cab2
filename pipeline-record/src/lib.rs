//! The canonical DNS observation record (§3) and its purely-functional
//! renderings (§4.A). This crate has no knowledge of workers, channels,
//! or routing — it is the value type the rest of the workspace moves
//! around.

pub mod enums;
pub mod frame;
pub mod record;
pub mod render;
pub mod wire;

pub use enums::{class_to_string, rcode_to_string, rdatatype_to_string, DnstapOperation, Family, Protocol};
pub use frame::{to_packet_layer, FrameError};
pub use record::{
    ATags, DnsHeader, DnsRecord, DnsTapMeta, DnstapOperationSerde, EdnsOptions, Extracted, Geo, NetworkInfo,
    ParseErrorKind, PublicSuffix, Reducer,
};
pub use render::{flatten, to_json, to_template, to_text_line, RenderError};
pub use wire::{decode_dns, decode_payload, Header};
