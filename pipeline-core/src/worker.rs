//! The uniform worker capability set (§4.B), realized as composition
//! over a [`GenericWorker`] base rather than a class hierarchy, per
//! §9's explicit guidance.

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use pipeline_record::DnsRecord;
use pipeline_telemetry::WorkerMetrics;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("channel capacity must be non-zero (worker {0:?})")]
    ZeroCapacity(String),
    #[error("worker init failed: {0}")]
    Init(String),
}

/// A forward- or dropped-route edge: a peer's name plus a cloned
/// sending half of its input channel.
#[derive(Clone)]
pub struct RouteHandle {
    pub name: String,
    pub sender: mpsc::Sender<DnsRecord>,
}

impl std::fmt::Debug for RouteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteHandle").field("name", &self.name).finish()
    }
}

/// Outcome of a worker's `run`, returned once both the ingress loop
/// (`CollectDone`) and, for sinks, the logging substage (`LoggingDone`)
/// have drained and exited.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub name: String,
}

/// A small per-worker free-list of reusable text buffers, amortizing
/// allocation on the hot egress path (§4.B). Deliberately per-worker
/// (not a global pool) to avoid false sharing across workers running
/// on different executor threads.
#[derive(Default)]
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    pub fn checkout(&self) -> BytesMut {
        self.free.lock().pop().unwrap_or_default()
    }

    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < 64 {
            free.push(buf);
        }
    }
}

/// The state every worker — source or sink — embeds. Concrete workers
/// hold a `GenericWorker` field and add only their producer/consumer
/// side effects; the dispatch loop itself (`dispatch.rs`) operates on
/// this struct generically.
pub struct GenericWorker {
    pub name: String,
    pub input_tx: mpsc::Sender<DnsRecord>,
    pub input_rx: mpsc::Receiver<DnsRecord>,
    /// `Some` only for sinks: the internal channel the logging
    /// substage drains. Sources never populate this, so the dispatch
    /// loop's "emit on owned outputChannel" step is a no-op for them —
    /// otherwise a source with no logging substage reading it would
    /// deadlock the moment it filled up.
    pub output_tx: Option<mpsc::Sender<DnsRecord>>,
    pub output_rx: Option<mpsc::Receiver<DnsRecord>>,
    pub forward_routes: Vec<RouteHandle>,
    pub dropped_routes: Vec<RouteHandle>,
    pub reload_tx: mpsc::Sender<ConfigSnapshot>,
    pub reload_rx: mpsc::Receiver<ConfigSnapshot>,
    pub stop_token: CancellationToken,
    pub metrics: WorkerMetrics,
    pub buffer_pool: BufferPool,
    pub config: ConfigSnapshot,
}

impl GenericWorker {
    pub fn new(config: ConfigSnapshot, metrics: WorkerMetrics) -> Result<Self, WorkerError> {
        let capacity = config.channel_capacity();
        if capacity == 0 {
            return Err(WorkerError::ZeroCapacity(config.stanza_name.clone()));
        }

        let (input_tx, input_rx) = mpsc::channel(capacity);
        let (output_tx, output_rx) = match config.role {
            crate::config::WorkerRole::Sink => {
                let (tx, rx) = mpsc::channel(capacity);
                (Some(tx), Some(rx))
            }
            crate::config::WorkerRole::Source => (None, None),
        };
        // reloadCh: capacity 1, matching the Go original.
        let (reload_tx, reload_rx) = mpsc::channel(1);

        Ok(Self {
            name: config.stanza_name.clone(),
            input_tx,
            input_rx,
            output_tx,
            output_rx,
            forward_routes: Vec::new(),
            dropped_routes: Vec::new(),
            reload_tx,
            reload_rx,
            stop_token: CancellationToken::new(),
            metrics,
            buffer_pool: BufferPool::default(),
            config,
        })
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_input_channel(&self) -> mpsc::Sender<DnsRecord> {
        self.input_tx.clone()
    }

    pub fn set_default_routes(&mut self, routes: Vec<RouteHandle>) {
        self.forward_routes = routes;
    }

    pub fn set_dropped_routes(&mut self, routes: Vec<RouteHandle>) {
        self.dropped_routes = routes;
    }

    pub fn get_default_routes(&self) -> &[RouteHandle] {
        &self.forward_routes
    }

    pub fn get_dropped_routes(&self) -> &[RouteHandle] {
        &self.dropped_routes
    }

    pub fn set_metrics(&mut self, metrics: WorkerMetrics) {
        self.metrics = metrics;
    }

    pub fn reload_sender(&self) -> mpsc::Sender<ConfigSnapshot> {
        self.reload_tx.clone()
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop_token.clone()
    }

    pub fn get_config(&self) -> &ConfigSnapshot {
        &self.config
    }

    pub fn role(&self) -> crate::config::WorkerRole {
        self.config.role
    }
}

/// The capability set every pipeline participant implements (§4.B).
/// `run` consumes `Box<Self>` because the dispatch loop owns the
/// worker's channels for its whole lifetime — there is no reason to
/// hand control back before `Stop`.
#[async_trait]
pub trait Worker: Send {
    fn name(&self) -> &str;
    fn input_sender(&self) -> mpsc::Sender<DnsRecord>;
    fn stop_token(&self) -> CancellationToken;
    fn role(&self) -> crate::config::WorkerRole;

    /// Non-blocking stop request; the caller awaits the `run` future's
    /// completion (or its `JoinHandle`) for the `Stop` acknowledgement.
    fn stop(&self) {
        self.stop_token().cancel();
    }

    fn reload_sender(&self) -> mpsc::Sender<ConfigSnapshot>;

    /// Attaches this worker's forward/dropped routes (§4.D step 5).
    /// Concrete workers delegate to their embedded `GenericWorker`.
    fn attach_routes(&mut self, forward: Vec<RouteHandle>, dropped: Vec<RouteHandle>);

    async fn reload_config(&self, snapshot: ConfigSnapshot) {
        // capacity-1 channel: an undelivered reload (receiver full or
        // gone) is logged, never fatal (§4.F).
        if self.reload_sender().try_send(snapshot).is_err() {
            tracing::warn!(worker = self.name(), "reload not delivered: worker busy or gone");
        }
    }

    async fn run(self: Box<Self>) -> WorkerOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, WorkerRole};
    use std::collections::HashMap;

    fn snapshot(role: WorkerRole) -> ConfigSnapshot {
        ConfigSnapshot {
            stanza_name: "w".into(),
            worker_kind: "test".into(),
            role,
            global: GlobalConfig {
                channel_buffer_size: 8,
                flush_interval_secs: 1,
            },
            params: serde_yaml::Value::Null,
            transforms: HashMap::new(),
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut cfg = snapshot(WorkerRole::Source);
        cfg.global.channel_buffer_size = 0;
        let err = GenericWorker::new(cfg, WorkerMetrics::noop("w")).unwrap_err();
        assert!(matches!(err, WorkerError::ZeroCapacity(_)));
    }

    #[test]
    fn sinks_get_an_output_channel_sources_do_not() {
        let sink = GenericWorker::new(snapshot(WorkerRole::Sink), WorkerMetrics::noop("sink")).unwrap();
        assert!(sink.output_tx.is_some());

        let source = GenericWorker::new(snapshot(WorkerRole::Source), WorkerMetrics::noop("source")).unwrap();
        assert!(source.output_tx.is_none());
    }

    #[test]
    fn buffer_pool_reuses_released_buffers() {
        let pool = BufferPool::default();
        let buf = pool.checkout();
        let ptr = buf.as_ptr();
        pool.release(buf);
        let buf2 = pool.checkout();
        // Not guaranteed by BytesMut's allocator, but with capacity 0
        // both checkouts return the same empty default - just assert
        // no panic and a well-formed empty buffer.
        let _ = ptr;
        assert!(buf2.is_empty());
    }
}
