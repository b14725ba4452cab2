//! Concrete worker kinds satisfying the `pipeline_core::worker::Worker`
//! contract: a synthetic generator and a JSON-lines replay source, and
//! file/tcp/mqtt sinks covering every format mode in §4.E. Each kind is
//! registered under its config-facing name in [`default_factory_table`],
//! the Rust rendering of the Go original's `CreateStanza` dispatch table
//! (§9: "a static factory table keyed by worker-kind name").

pub mod generator;
pub mod replay;
pub mod sink;

pub use generator::GeneratorSource;
pub use replay::ReplaySource;
pub use sink::file::FileSink;
pub use sink::mqtt::MqttSink;
pub use sink::tcp::TcpSink;

use pipeline_core::assembler::WorkerFactoryTable;

/// Builds the factory table every worker kind in this crate registers
/// itself under. `pipeline-cli` extends or replaces this with its own
/// table when a deployment adds transform plugins' own worker kinds;
/// this crate only knows about the kinds it ships.
pub fn default_factory_table() -> WorkerFactoryTable {
    let mut table = WorkerFactoryTable::new();
    table
        .register("generator", GeneratorSource::new)
        .register("replay", ReplaySource::new)
        .register("file", FileSink::new)
        .register("stdout", FileSink::new)
        .register("tcp", TcpSink::new)
        .register("mqtt", MqttSink::new);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_registers_every_worker_kind() {
        let table = default_factory_table();
        for kind in ["generator", "replay", "file", "stdout", "tcp", "mqtt"] {
            assert!(table.get(kind).is_some(), "missing constructor for {kind:?}");
        }
    }
}
