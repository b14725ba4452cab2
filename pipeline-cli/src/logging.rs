//! Structured logging setup, grounded on the teacher's
//! `init_logging`/`setup_global_subscriber` idiom (`connlib/clients/
//! apple::init_logging`, `linux-client::main`'s `setup_global_subscriber`
//! call): a `tracing_subscriber::registry()` with an `EnvFilter` layer
//! plus a stdout `fmt` layer, and an optional rolling file appender when
//! `--log-dir` is set.

use std::path::Path;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Keeps the file appender's background flush thread alive for the
/// process lifetime; dropping it stops the writer.
pub struct LoggingHandle {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Installs the global subscriber. `RUST_LOG` (falling back to `info`)
/// drives the filter, matching every other binary in the teacher
/// workspace rather than inventing a bespoke verbosity flag.
pub fn init(log_dir: Option<&Path>) -> LoggingHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "pipeline.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    LoggingHandle { _file_guard: guard }
}
