//! A synthetic record generator: the simplest possible source worker,
//! used for smoke-testing pipelines and for Scenario A-C/F in the test
//! suite. Ticks on an interval, self-feeding its own input channel the
//! same way any other source's capture loop would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline_core::config::ConfigSnapshot;
use pipeline_core::dispatch::{run_ingress_loop, NoopReload, PassThrough, TransformChain};
use pipeline_core::worker::{GenericWorker, RouteHandle, Worker, WorkerError, WorkerOutcome};
use pipeline_record::DnsRecord;
use pipeline_telemetry::WorkerMetrics;
use tokio::time::interval;

/// `params`: `tick-interval-ms` (default 100), `qname-prefix` (default
/// `"message"`).
pub struct GeneratorSource {
    generic: GenericWorker,
}

impl GeneratorSource {
    pub fn new(config: ConfigSnapshot, metrics: WorkerMetrics) -> Result<Box<dyn Worker>, WorkerError> {
        let generic = GenericWorker::new(config, metrics)?;
        Ok(Box::new(Self { generic }))
    }
}

#[async_trait]
impl Worker for GeneratorSource {
    fn name(&self) -> &str {
        self.generic.get_name()
    }

    fn input_sender(&self) -> tokio::sync::mpsc::Sender<DnsRecord> {
        self.generic.get_input_channel()
    }

    fn stop_token(&self) -> tokio_util::sync::CancellationToken {
        self.generic.stop_token()
    }

    fn role(&self) -> pipeline_core::config::WorkerRole {
        self.generic.role()
    }

    fn reload_sender(&self) -> tokio::sync::mpsc::Sender<ConfigSnapshot> {
        self.generic.reload_sender()
    }

    fn attach_routes(&mut self, forward: Vec<RouteHandle>, dropped: Vec<RouteHandle>) {
        self.generic.set_default_routes(forward);
        self.generic.set_dropped_routes(dropped);
    }

    async fn run(mut self: Box<Self>) -> WorkerOutcome {
        let tick_ms = self.generic.get_config().param_u64("tick-interval-ms").unwrap_or(100);
        let prefix = self
            .generic
            .get_config()
            .param_str("qname-prefix")
            .unwrap_or("message")
            .to_string();

        let self_feed = self.generic.get_input_channel();
        let stop = self.generic.stop_token();
        let name = self.generic.get_name().to_string();
        let counter = Arc::new(AtomicU64::new(0));

        let producer = tokio::spawn(async move {
            let mut tick = interval(Duration::from_millis(tick_ms.max(1)));
            loop {
                tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    _ = tick.tick() => {
                        let n = counter.fetch_add(1, Ordering::Relaxed);
                        let mut record = DnsRecord::fake();
                        record.dns.qname = format!("{prefix}-{n}");
                        record.dns.id = n as u16;
                        // A source's own admission control: if the
                        // input channel is saturated we drop rather
                        // than block the producer loop indefinitely,
                        // per §5's "admission control... is the
                        // source worker's responsibility to encode".
                        if self_feed.try_send(record).is_err() {
                            tracing::debug!(worker = name.as_str(), "generator dropped a tick, input channel full");
                        }
                    }
                }
            }
        });

        let chain = Arc::new(TransformChain::new(vec![Box::new(PassThrough)]));
        run_ingress_loop(&mut self.generic, chain, NoopReload).await;

        producer.abort();
        let _ = producer.await;

        WorkerOutcome { name: self.generic.name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::config::{GlobalConfig, WorkerRole};
    use std::collections::HashMap;

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot {
            stanza_name: "gen".into(),
            worker_kind: "generator".into(),
            role: WorkerRole::Source,
            global: GlobalConfig {
                channel_buffer_size: 16,
                flush_interval_secs: 1,
            },
            params: serde_yaml::from_str("tick-interval-ms: 1").unwrap(),
            transforms: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn generates_and_forwards_records_until_stopped() {
        let worker = GeneratorSource::new(snapshot(), WorkerMetrics::noop("gen")).unwrap();
        let (peer_tx, mut peer_rx) = tokio::sync::mpsc::channel(64);
        let mut boxed = worker;
        boxed.attach_routes(
            vec![RouteHandle {
                name: "peer".into(),
                sender: peer_tx,
            }],
            vec![],
        );
        let stop = boxed.stop_token();

        let join = tokio::spawn(boxed.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.cancel();
        let outcome = join.await.unwrap();
        assert_eq!(outcome.name, "gen");

        let mut received = 0;
        while peer_rx.try_recv().is_ok() {
            received += 1;
        }
        assert!(received > 0);
    }
}
