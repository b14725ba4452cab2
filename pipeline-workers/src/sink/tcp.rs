//! A TCP line-stream sink: encodes each record with the same format
//! modes as [`crate::sink::file::FileSink`] and writes it to a
//! persistent TCP connection, reconnecting with exponential backoff on
//! any I/O error — grounded on `phoenix-channel`'s
//! `reconnect_backoff`/`next_backoff` reconnect loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use pipeline_core::config::ConfigSnapshot;
use pipeline_core::dispatch::{run_ingress_loop, NoopReload, PassThrough, TransformChain};
use pipeline_core::worker::{GenericWorker, RouteHandle, Worker, WorkerError, WorkerOutcome};
use pipeline_record::DnsRecord;
use pipeline_telemetry::WorkerMetrics;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::sink::format::{encode_one, SinkMode};

#[derive(Debug, thiserror::Error)]
pub enum TcpSinkError {
    #[error("`address` is required for the tcp sink (host:port)")]
    MissingAddress,
    #[error("`mode` is required for the tcp sink")]
    MissingMode,
    #[error("{0}")]
    UnknownMode(#[from] crate::sink::format::UnknownModeError),
}

/// `params`: `address` (`host:port`, required), `mode` (required,
/// same set as [`SinkMode`]), `text-format`, `delimiter`,
/// `connect-timeout-ms` (default 5000).
pub struct TcpSink {
    generic: GenericWorker,
    address: String,
    mode: SinkMode,
    text_format: Vec<String>,
    delimiter: String,
    template: Option<String>,
    connect_timeout: Duration,
}

impl TcpSink {
    pub fn new(config: ConfigSnapshot, metrics: WorkerMetrics) -> Result<Box<dyn Worker>, WorkerError> {
        let address = config
            .param_str("address")
            .map(str::to_string)
            .ok_or_else(|| WorkerError::Init(TcpSinkError::MissingAddress.to_string()))?;
        let mode: SinkMode = config
            .param_str("mode")
            .ok_or_else(|| WorkerError::Init(TcpSinkError::MissingMode.to_string()))?
            .parse()
            .map_err(|e: crate::sink::format::UnknownModeError| WorkerError::Init(e.to_string()))?;
        let text_format = config
            .param_str("text-format")
            .unwrap_or("qr identity qtype")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let delimiter = config.param_str("delimiter").unwrap_or(" ").to_string();
        let template = config.param_str("template").map(str::to_string);
        let connect_timeout = Duration::from_millis(config.param_u64("connect-timeout-ms").unwrap_or(5000));

        let generic = GenericWorker::new(config, metrics)?;
        Ok(Box::new(Self {
            generic,
            address,
            mode,
            text_format,
            delimiter,
            template,
            connect_timeout,
        }))
    }
}

#[async_trait]
impl Worker for TcpSink {
    fn name(&self) -> &str {
        self.generic.get_name()
    }

    fn input_sender(&self) -> mpsc::Sender<DnsRecord> {
        self.generic.get_input_channel()
    }

    fn stop_token(&self) -> CancellationToken {
        self.generic.stop_token()
    }

    fn role(&self) -> pipeline_core::config::WorkerRole {
        self.generic.role()
    }

    fn reload_sender(&self) -> mpsc::Sender<ConfigSnapshot> {
        self.generic.reload_sender()
    }

    fn attach_routes(&mut self, forward: Vec<RouteHandle>, dropped: Vec<RouteHandle>) {
        self.generic.set_default_routes(forward);
        self.generic.set_dropped_routes(dropped);
    }

    async fn run(mut self: Box<Self>) -> WorkerOutcome {
        let output_rx = self.generic.output_rx.take().expect("sink role always has an output channel");
        let metrics = self.generic.metrics.clone();
        let name = self.generic.get_name().to_string();

        let logging = tokio::spawn(run_reconnecting_logging_substage(
            name,
            output_rx,
            self.address.clone(),
            self.mode,
            self.text_format.clone(),
            self.delimiter.clone(),
            self.template.clone(),
            self.connect_timeout,
            metrics,
        ));

        let chain = Arc::new(TransformChain::new(vec![Box::new(PassThrough)]));
        run_ingress_loop(&mut self.generic, chain, NoopReload).await;

        if let Err(error) = logging.await {
            tracing::error!(worker = self.generic.name.as_str(), %error, "logging substage panicked");
        }

        WorkerOutcome { name: self.generic.name }
    }
}

fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: None,
        ..Default::default()
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_reconnecting_logging_substage(
    name: String,
    mut output_rx: mpsc::Receiver<DnsRecord>,
    address: String,
    mode: SinkMode,
    text_format: Vec<String>,
    delimiter: String,
    template: Option<String>,
    connect_timeout: Duration,
    metrics: WorkerMetrics,
) {
    let text_format_refs: Vec<&str> = text_format.iter().map(String::as_str).collect();
    let mut backoff = reconnect_backoff();
    let mut stream: Option<TcpStream> = None;

    loop {
        if stream.is_none() {
            match tokio::time::timeout(connect_timeout, TcpStream::connect(&address)).await {
                Ok(Ok(connected)) => {
                    tracing::info!(worker = name.as_str(), address = address.as_str(), "tcp sink connected");
                    backoff.reset();
                    stream = Some(connected);
                }
                Ok(Err(error)) => {
                    tracing::warn!(worker = name.as_str(), %error, "tcp connect failed");
                }
                Err(_) => {
                    tracing::warn!(worker = name.as_str(), "tcp connect timed out");
                }
            }
            if stream.is_none() {
                let Some(delay) = backoff.next_backoff() else {
                    tracing::error!(worker = name.as_str(), "reconnect backoff expired, giving up");
                    break;
                };
                // Keyed on the channel closing (every sender dropped), not the
                // shared stop token: `run_ingress_loop` only drops its sender
                // after its own post-stop drain has pushed every buffered
                // record, and those records stay queued in `output_rx` across
                // this sleep either way, so waiting for closure can't lose any.
                tokio::select! {
                    biased;
                    () = output_rx.closed() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                continue;
            }
        }

        let Some(record) = output_rx.recv().await else { break };

        let bytes = match encode_one(&record, mode, &text_format_refs, &delimiter, template.as_deref()) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::error!(worker = name.as_str(), %error, "encode failed, record discarded");
                metrics.count_egress_discarded(1);
                continue;
            }
        };

        if let Some(conn) = stream.as_mut() {
            if let Err(error) = conn.write_all(&bytes).await {
                tracing::warn!(worker = name.as_str(), %error, "tcp write failed, reconnecting");
                metrics.count_egress_discarded(1);
                stream = None;
            }
        }
    }

    while let Ok(record) = output_rx.try_recv() {
        let Ok(bytes) = encode_one(&record, mode, &text_format_refs, &delimiter, template.as_deref()) else {
            metrics.count_egress_discarded(1);
            continue;
        };
        if let Some(conn) = stream.as_mut() {
            if conn.write_all(&bytes).await.is_err() {
                metrics.count_egress_discarded(1);
            }
        } else {
            metrics.count_egress_discarded(1);
        }
    }
}
