//! Binary entry point: CLI parsing, logging setup, config loading,
//! pipeline assembly, and the signal-driven reload/shutdown loop (§4.F
//! expansion). Grounded on the teacher's `linux-client::main` shape —
//! parse args, init logging, connect/assemble, poll for signals, tear
//! down on exit — generalized from one VPN session to one pipeline.

mod logging;
mod signals;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pipeline_core::assembler::assemble;
use pipeline_core::config::Config;
use pipeline_core::control::PipelineController;
use pipeline_telemetry::TelemetryHub;
use signals::ControlEvent;

/// A DNS telemetry pipeline runtime: wires collectors and loggers
/// together per a YAML pipeline configuration and runs them until
/// stopped.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the pipeline configuration file.
    #[arg(short, long, env = "PIPELINE_CONFIG", default_value = "pipeline.yaml")]
    config: PathBuf,

    /// Directory for rolling file logs. Stdout logging always runs
    /// regardless of this flag.
    #[arg(long, env = "PIPELINE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Parse and assemble the configuration, then exit without starting
    /// any worker. Exit code reflects validity (§6 exit codes).
    #[arg(long)]
    validate_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logging = logging::init(cli.log_dir.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_path(&cli.config).with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let factory = pipeline_workers::default_factory_table();
    let telemetry = TelemetryHub::new();

    let pipeline = assemble(&config, &factory, &telemetry).context("failed to assemble pipeline")?;

    if cli.validate_only {
        tracing::info!(workers = pipeline.sources.len() + pipeline.sinks.len(), "configuration is valid");
        return Ok(());
    }

    let mut controller = PipelineController::spawn(pipeline);
    tracing::info!(config = %cli.config.display(), "pipeline started");

    loop {
        match signals::next_event().await {
            ControlEvent::Reload => {
                let reloaded = Config::from_path(&cli.config).with_context(|| format!("failed to reload config from {}", cli.config.display()));
                match reloaded {
                    Ok(new_config) => controller.reload(new_config).await,
                    Err(error) => tracing::error!(%error, "reload skipped: config could not be parsed"),
                }
            }
            ControlEvent::Shutdown => break,
        }
    }

    controller.shutdown().await;
    tracing::info!("pipeline stopped");
    Ok(())
}
