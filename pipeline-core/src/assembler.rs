//! The pipeline assembler (§4.D), grounded on `pkginit/pipelines.go`'s
//! `InitPipelines`/`GetStanzaConfig`/`CreateRouting`/`CreateStanza`.
//!
//! Every failure mode here returns a structured [`AssemblyError`]
//! rather than panicking (§9 "Panic on malformed config"): the Go
//! original calls `panic()` on malformed stanzas; only `pipeline-cli`'s
//! `main` decides whether a given error is fatal enough to exit.

use std::collections::HashMap;

use pipeline_telemetry::TelemetryHub;

use crate::config::{merge_params, Config, ConfigSnapshot, PipelineStanza, WorkerRole};
use crate::graph::{GraphError, RoutingGraph};
use crate::worker::{RouteHandle, Worker, WorkerError};

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("stanza {0:?} must declare exactly one worker kind under `params`, found {1}")]
    NotExactlyOneParam(String, usize),
    #[error("stanza {stanza:?} uses unknown worker kind {kind:?}")]
    UnknownWorkerKind { stanza: String, kind: String },
    #[error("worker {0:?} failed to initialize: {1}")]
    WorkerInit(String, #[source] WorkerError),
    #[error("no constructor registered for worker kind {0:?}")]
    NoFactory(String),
}

/// Constructs a boxed [`Worker`] from its per-stanza snapshot and
/// metrics handle. Keyed by worker-kind name in [`WorkerFactoryTable`]
/// — the Rust rendering of the Go `CreateStanza` dispatch table,
/// flattened into a static map per §9's explicit guidance.
pub type WorkerConstructor =
    fn(ConfigSnapshot, pipeline_telemetry::WorkerMetrics) -> Result<Box<dyn Worker>, WorkerError>;

#[derive(Default, Clone)]
pub struct WorkerFactoryTable {
    constructors: HashMap<&'static str, WorkerConstructor>,
}

impl WorkerFactoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &'static str, ctor: WorkerConstructor) -> &mut Self {
        self.constructors.insert(kind, ctor);
        self
    }

    pub fn get(&self, kind: &str) -> Option<WorkerConstructor> {
        self.constructors.get(kind).copied()
    }
}

/// The fully assembled pipeline: two name → worker maps (sources,
/// sinks), the validated routing graph, and the per-stanza snapshots
/// needed to re-derive configs on reload (§4.F).
pub struct Pipeline {
    pub sources: Vec<(String, Box<dyn Worker>)>,
    pub sinks: Vec<(String, Box<dyn Worker>)>,
    pub graph: RoutingGraph,
    pub stanzas: Vec<PipelineStanza>,
    pub config: Config,
}

impl Pipeline {
    pub fn worker_names(&self) -> impl Iterator<Item = &str> {
        self.sources
            .iter()
            .chain(self.sinks.iter())
            .map(|(name, _)| name.as_str())
    }
}

/// Derives the isolated per-stanza snapshot (§4.D step 3): clone the
/// global config, resolve the stanza's single worker kind against
/// `collectors`/`loggers`, merge in that kind's named defaults, and
/// attach the transforms map.
pub fn derive_snapshot(config: &Config, stanza: &PipelineStanza) -> Result<ConfigSnapshot, AssemblyError> {
    if stanza.params.len() != 1 {
        return Err(AssemblyError::NotExactlyOneParam(stanza.name.clone(), stanza.params.len()));
    }
    let (kind, override_params) = stanza.params.iter().next().expect("checked len == 1 above");

    let role = if config.collectors.contains_key(kind) {
        WorkerRole::Source
    } else if config.loggers.contains_key(kind) {
        WorkerRole::Sink
    } else {
        return Err(AssemblyError::UnknownWorkerKind {
            stanza: stanza.name.clone(),
            kind: kind.clone(),
        });
    };

    let default = match role {
        WorkerRole::Source => config.collectors.get(kind),
        WorkerRole::Sink => config.loggers.get(kind),
    };

    Ok(ConfigSnapshot {
        stanza_name: stanza.name.clone(),
        worker_kind: kind.clone(),
        role,
        global: config.global.clone(),
        params: merge_params(default, override_params),
        transforms: stanza.transforms.clone(),
    })
}

/// Runs the full 6-step assembly algorithm (§4.D) and returns a
/// [`Pipeline`] ready to hand to [`crate::control::PipelineController`].
pub fn assemble(config: &Config, factory: &WorkerFactoryTable, telemetry: &TelemetryHub) -> Result<Pipeline, AssemblyError> {
    // Steps 1-2: duplicate names, no-routes-defined, unresolved routes,
    // self-loops.
    let graph = RoutingGraph::build(&config.pipelines)?;

    // Step 3: derive one isolated snapshot per stanza, and step 4:
    // instantiate the worker.
    let mut sources = Vec::new();
    let mut sinks = Vec::new();

    for stanza in &config.pipelines {
        let snapshot = derive_snapshot(config, stanza)?;
        let ctor = factory
            .get(&snapshot.worker_kind)
            .ok_or_else(|| AssemblyError::NoFactory(snapshot.worker_kind.clone()))?;
        let metrics = telemetry.worker_metrics(&stanza.name);
        let worker = ctor(snapshot.clone(), metrics).map_err(|e| AssemblyError::WorkerInit(stanza.name.clone(), e))?;

        match snapshot.role {
            WorkerRole::Source => sources.push((stanza.name.clone(), worker)),
            WorkerRole::Sink => sinks.push((stanza.name.clone(), worker)),
        }
    }

    // Step 5: attach forward/dropped routes via the worker abstraction.
    // Build a name -> input_sender lookup first so each worker's route
    // list can be resolved without holding multiple mutable borrows.
    let senders: HashMap<String, tokio::sync::mpsc::Sender<pipeline_record::DnsRecord>> = sources
        .iter()
        .map(|(name, w)| (name.clone(), w.input_sender()))
        .chain(sinks.iter().map(|(name, w)| (name.clone(), w.input_sender())))
        .collect();

    for (name, worker) in sources.iter_mut().chain(sinks.iter_mut()) {
        let route_set = graph.routes_for(name).expect("graph built from the same stanza list");
        let forward = resolve_routes(&route_set.forward, &senders);
        let dropped = resolve_routes(&route_set.dropped, &senders);
        worker.attach_routes(forward, dropped);
    }

    Ok(Pipeline {
        sources,
        sinks,
        graph,
        stanzas: config.pipelines.clone(),
        config: config.clone(),
    })
}

fn resolve_routes(
    names: &[String],
    senders: &HashMap<String, tokio::sync::mpsc::Sender<pipeline_record::DnsRecord>>,
) -> Vec<RouteHandle> {
    names
        .iter()
        .filter_map(|name| {
            senders.get(name).map(|sender| RouteHandle {
                name: name.clone(),
                sender: sender.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingPolicy;
    use std::collections::HashMap as Map;

    fn config_with_two_stanzas() -> Config {
        let mut collectors = Map::new();
        collectors.insert("generator".to_string(), serde_yaml::Value::Null);
        let mut loggers = Map::new();
        loggers.insert("stdout".to_string(), serde_yaml::Value::Null);

        let mut source_params = Map::new();
        source_params.insert("generator".to_string(), serde_yaml::Value::Null);
        let source = PipelineStanza {
            name: "source".into(),
            params: source_params,
            transforms: Map::new(),
            routing_policy: RoutingPolicy {
                forward: vec!["sink".into()],
                dropped: vec![],
            },
        };

        let mut sink_params = Map::new();
        sink_params.insert("stdout".to_string(), serde_yaml::Value::Null);
        let sink = PipelineStanza {
            name: "sink".into(),
            params: sink_params,
            transforms: Map::new(),
            routing_policy: RoutingPolicy::default(),
        };

        Config {
            global: Default::default(),
            collectors,
            loggers,
            pipelines: vec![source, sink],
        }
    }

    #[test]
    fn derives_source_and_sink_roles_from_collectors_and_loggers() {
        let config = config_with_two_stanzas();
        let source_snapshot = derive_snapshot(&config, &config.pipelines[0]).unwrap();
        assert_eq!(source_snapshot.role, WorkerRole::Source);
        let sink_snapshot = derive_snapshot(&config, &config.pipelines[1]).unwrap();
        assert_eq!(sink_snapshot.role, WorkerRole::Sink);
    }

    #[test]
    fn unknown_worker_kind_is_rejected() {
        let mut config = config_with_two_stanzas();
        config.pipelines[0].params = {
            let mut m = Map::new();
            m.insert("nonsense".to_string(), serde_yaml::Value::Null);
            m
        };
        let err = derive_snapshot(&config, &config.pipelines[0]).unwrap_err();
        assert!(matches!(err, AssemblyError::UnknownWorkerKind { .. }));
    }

    #[test]
    fn multi_entry_params_is_rejected() {
        let mut config = config_with_two_stanzas();
        config.pipelines[0].params.insert("stdout".to_string(), serde_yaml::Value::Null);
        let err = derive_snapshot(&config, &config.pipelines[0]).unwrap_err();
        assert!(matches!(err, AssemblyError::NotExactlyOneParam(_, 2)));
    }
}
