//! Concrete sink workers (§4.E worked examples): each owns an external
//! medium and runs a serialization substage alongside the shared
//! ingress/transform/egress loop from `pipeline_core::dispatch`.

pub mod file;
pub mod format;
pub mod mqtt;
pub mod rotation;
pub mod tcp;
