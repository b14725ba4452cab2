//! The pipeline runtime: the worker abstraction, the routing graph,
//! the dispatch loop, and the reload/shutdown controller (§2 B–F).
//!
//! The record model lives in `pipeline-record`; concrete source/sink
//! implementations live in `pipeline-workers`. This crate is the
//! data-plane abstraction the rest of the workspace adapts to.

pub mod assembler;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod graph;
pub mod worker;

pub use assembler::{assemble, derive_snapshot, AssemblyError, Pipeline, WorkerConstructor, WorkerFactoryTable};
pub use config::{Config, ConfigError, ConfigSnapshot, GlobalConfig, PipelineStanza, RoutingPolicy, WorkerRole};
pub use control::PipelineController;
pub use dispatch::{run_ingress_loop, NoopReload, PassThrough, ReloadHandler, Transform, TransformChain, TransformOutcome};
pub use graph::{GraphError, RouteSet, RoutingGraph};
pub use worker::{BufferPool, GenericWorker, RouteHandle, Worker, WorkerError, WorkerOutcome};
