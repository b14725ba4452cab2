//! Replays previously captured records from a JSON-lines file. Used
//! for deterministic pipeline tests and for replaying a dump captured
//! by a `pipeline-workers` file sink in `json` mode.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline_core::config::ConfigSnapshot;
use pipeline_core::dispatch::{run_ingress_loop, NoopReload, PassThrough, TransformChain};
use pipeline_core::worker::{GenericWorker, RouteHandle, Worker, WorkerError, WorkerOutcome};
use pipeline_record::DnsRecord;
use pipeline_telemetry::WorkerMetrics;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("`file-path` is required for the replay source")]
    MissingFilePath,
}

/// `params`: `file-path` (required, one JSON-encoded `DnsRecord` per
/// line). Malformed lines are logged and skipped rather than aborting
/// the replay — matching §7's "steady-state errors are reported via
/// counters and logs."
pub struct ReplaySource {
    generic: GenericWorker,
    file_path: PathBuf,
}

impl ReplaySource {
    pub fn new(config: ConfigSnapshot, metrics: WorkerMetrics) -> Result<Box<dyn Worker>, WorkerError> {
        let file_path = config
            .param_str("file-path")
            .map(PathBuf::from)
            .ok_or_else(|| WorkerError::Init(ReplayError::MissingFilePath.to_string()))?;
        let generic = GenericWorker::new(config, metrics)?;
        Ok(Box::new(Self { generic, file_path }))
    }
}

#[async_trait]
impl Worker for ReplaySource {
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
        let self_feed = self.generic.get_input_channel();
        let stop = self.generic.stop_token();
        let name = self.generic.get_name().to_string();
        let path = self.file_path.clone();

        let producer = tokio::spawn(async move {
            let file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(error) => {
                    tracing::error!(worker = name.as_str(), %error, path = %path.display(), "replay source could not open file");
                    return;
                }
            };
            let mut lines = BufReader::new(file).lines();
            loop {
                let next = tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    line = lines.next_line() => line,
                };
                let Ok(Some(line)) = next else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<DnsRecord>(&line) {
                    Ok(record) => {
                        if self_feed.send(record).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(worker = name.as_str(), %error, "skipping malformed replay line");
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
    use std::io::Write;

    fn snapshot(path: &str) -> ConfigSnapshot {
        ConfigSnapshot {
            stanza_name: "replay".into(),
            worker_kind: "replay".into(),
            role: WorkerRole::Source,
            global: GlobalConfig {
                channel_buffer_size: 16,
                flush_interval_secs: 1,
            },
            params: serde_yaml::from_str(&format!("file-path: {path}")).unwrap(),
            transforms: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn replays_every_record_in_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..3 {
            let mut record = DnsRecord::fake();
            record.dns.qname = format!("replay-{i}");
            writeln!(file, "{}", serde_json::to_string(&record).unwrap()).unwrap();
        }

        let worker = ReplaySource::new(snapshot(&file.path().display().to_string()), WorkerMetrics::noop("replay")).unwrap();
        let mut boxed = worker;
        let (peer_tx, mut peer_rx) = tokio::sync::mpsc::channel(64);
        boxed.attach_routes(
            vec![RouteHandle {
                name: "peer".into(),
                sender: peer_tx.clone(),
            }],
            vec![],
        );
        let stop = boxed.stop_token();
        let join = tokio::spawn(boxed.run());

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(tokio::time::timeout(std::time::Duration::from_secs(1), peer_rx.recv()).await.unwrap().unwrap());
        }
        assert_eq!(received[2].dns.qname, "replay-2");

        stop.cancel();
        drop(peer_tx);
        join.await.unwrap();
    }

    #[test]
    fn missing_file_path_is_rejected_at_construction() {
        let mut cfg = snapshot("/tmp/whatever");
        cfg.params = serde_yaml::Value::Null;
        let err = ReplaySource::new(cfg, WorkerMetrics::noop("replay")).unwrap_err();
        assert!(matches!(err, WorkerError::Init(_)));
    }
}
