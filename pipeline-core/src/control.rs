//! Reload & shutdown controller (§4.F). Owns every worker's task
//! handle, stop token, and reload sender; `pipeline-cli` wires OS
//! signals into [`PipelineController::reload`] and
//! [`PipelineController::shutdown`].

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::assembler::{derive_snapshot, Pipeline};
use crate::config::{Config, ConfigSnapshot};
use crate::graph::RoutingGraph;
use crate::worker::{Worker, WorkerOutcome};

struct WorkerHandle {
    name: String,
    stop_token: CancellationToken,
    reload_tx: mpsc::Sender<ConfigSnapshot>,
    join: JoinHandle<WorkerOutcome>,
}

/// A running pipeline: every worker spawned as its own task, source
/// and sink handles kept separately so shutdown can order itself
/// correctly (§4.F: sources first, then sinks).
pub struct PipelineController {
    sources: Vec<WorkerHandle>,
    sinks: Vec<WorkerHandle>,
    graph: RoutingGraph,
    config: Config,
}

fn spawn_one(name: String, worker: Box<dyn Worker>) -> WorkerHandle {
    let stop_token = worker.stop_token();
    let reload_tx = worker.reload_sender();
    let join = tokio::spawn(worker.run());
    WorkerHandle {
        name,
        stop_token,
        reload_tx,
        join,
    }
}

impl PipelineController {
    /// Takes ownership of an assembled [`Pipeline`] and starts every
    /// worker (§4.D step 6: "hand control to the lifecycle
    /// controller"). Start order is unspecified, matching §3.
    pub fn spawn(pipeline: Pipeline) -> Self {
        let sources = pipeline.sources.into_iter().map(|(n, w)| spawn_one(n, w)).collect();
        let sinks = pipeline.sinks.into_iter().map(|(n, w)| spawn_one(n, w)).collect();

        Self {
            sources,
            sinks,
            graph: pipeline.graph,
            config: pipeline.config,
        }
    }

    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    /// Walks every stanza in `new_config`, re-derives its isolated
    /// snapshot, and delivers it over that worker's `reload_rx`.
    /// Undeliverable names (renamed or removed workers) are logged,
    /// never fatal. Does not rebuild the routing graph: topology
    /// changes require a full restart (§4.F).
    pub async fn reload(&mut self, new_config: Config) {
        for stanza in &new_config.pipelines {
            let snapshot = match derive_snapshot(&new_config, stanza) {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    tracing::warn!(stanza = %stanza.name, %error, "reload snapshot could not be derived, skipping");
                    continue;
                }
            };

            let handle = self
                .sources
                .iter()
                .chain(self.sinks.iter())
                .find(|handle| handle.name == stanza.name);

            match handle {
                Some(handle) => {
                    if handle.reload_tx.try_send(snapshot).is_err() {
                        tracing::warn!(stanza = %stanza.name, "reload not delivered: worker busy or gone");
                    }
                }
                None => {
                    tracing::warn!(stanza = %stanza.name, "reload target not found (renamed or removed), skipping");
                }
            }
        }

        self.config = new_config;
    }

    /// Stops sources first, awaiting each `run` task's completion
    /// (`CollectDone` then `LoggingDone`, folded into one join per
    /// worker), then stops sinks the same way. `CancellationToken::
    /// cancel` is naturally idempotent, so repeated shutdown calls are
    /// harmless.
    pub async fn shutdown(mut self) {
        for handle in &self.sources {
            handle.stop_token.cancel();
        }
        for handle in self.sources.drain(..) {
            if let Err(error) = handle.join.await {
                tracing::error!(worker = %handle.name, %error, "worker task panicked during shutdown");
            }
        }

        for handle in &self.sinks {
            handle.stop_token.cancel();
        }
        for handle in self.sinks.drain(..) {
            if let Err(error) = handle.join.await {
                tracing::error!(worker = %handle.name, %error, "worker task panicked during shutdown");
            }
        }
    }
}
