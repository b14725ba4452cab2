//! The dispatch loop (§4.E) — the heart of the system. One instance
//! runs per worker, driving ingress → transform → egress plus reload
//! and stop handling.

use std::sync::Arc;

use pipeline_record::DnsRecord;
use tokio::sync::mpsc;

use crate::config::ConfigSnapshot;
use crate::worker::{GenericWorker, RouteHandle};

/// The black-box `ProcessMessage(record) → {pass, drop}` transform
/// contract (§1: "out of scope... treated as a black box"). Concrete
/// transforms (filtering, geoIP, normalization) live outside this
/// crate; `pipeline-core` only needs the interface to run the
/// ingress/transform/egress loop.
pub trait Transform: Send + Sync + std::fmt::Debug {
    fn process(&self, record: &mut DnsRecord) -> TransformOutcome;

    /// Re-derive any cached fields from a freshly delivered config
    /// snapshot (§4.E reload branch: "ask transforms to reload").
    fn reload(&self, _transforms_cfg: &std::collections::HashMap<String, serde_yaml::Value>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    Pass,
    Drop,
}

/// An ordered chain of transforms; the first to report `Drop` wins
/// (invariant 3: once dropped, a record must not reach a forward
/// route of this worker).
#[derive(Debug, Default)]
pub struct TransformChain {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformChain {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }

    pub fn process(&self, record: &mut DnsRecord) -> TransformOutcome {
        for transform in &self.transforms {
            if transform.process(record) == TransformOutcome::Drop {
                return TransformOutcome::Drop;
            }
        }
        TransformOutcome::Pass
    }

    pub fn reload(&self, transforms_cfg: &std::collections::HashMap<String, serde_yaml::Value>) {
        for transform in &self.transforms {
            transform.reload(transforms_cfg);
        }
    }
}

/// A transform that never drops; the default chain for stanzas that
/// declare no `transforms`.
#[derive(Debug, Default)]
pub struct PassThrough;

impl Transform for PassThrough {
    fn process(&self, _record: &mut DnsRecord) -> TransformOutcome {
        TransformOutcome::Pass
    }
}

/// Hook invoked once per delivered reload snapshot, letting a concrete
/// worker re-derive cached fields (format tokens, compiled templates)
/// before the snapshot replaces `generic.config`.
pub trait ReloadHandler: Send {
    fn on_reload(&mut self, new_config: &ConfigSnapshot);
}

/// A handler that has nothing extra to re-derive on reload.
pub struct NoopReload;

impl ReloadHandler for NoopReload {
    fn on_reload(&mut self, _new_config: &ConfigSnapshot) {}
}

/// Sends `record` down every route in `routes`, bounded-blocking
/// (§5 backpressure). A peer whose receiver has already gone away
/// (closed channel) is logged and skipped rather than retried —
/// there's no meaningful backpressure to apply against a worker that
/// no longer exists.
async fn fan_out(routes: &[RouteHandle], record: &DnsRecord, worker_name: &str) {
    for route in routes {
        if route.sender.send(record.clone()).await.is_err() {
            tracing::warn!(
                from = worker_name,
                to = route.name.as_str(),
                "forward route's receiver is gone, record not delivered"
            );
        }
    }
}

/// Sends `record` down every forward route. A forward peer whose
/// receiver has gone away counts as the one case where a record is
/// discarded off a forward edge (§4.E: "No worker is allowed to
/// discard silently on a forward edge without also incrementing a
/// dropped-on-full counter and invoking the dropped-routes path") —
/// so failures here also increment `dropped_on_full` and are replayed
/// onto this worker's own dropped routes for audit visibility.
async fn fan_out_forward(generic: &GenericWorker, record: &DnsRecord) {
    for route in &generic.forward_routes {
        if route.sender.send(record.clone()).await.is_err() {
            tracing::warn!(
                from = generic.name.as_str(),
                to = route.name.as_str(),
                "forward route's receiver is gone, record not delivered"
            );
            generic.metrics.count_dropped_on_full();
            fan_out(&generic.dropped_routes, record, &generic.name).await;
        }
    }
}

/// Runs the ingress/transform/egress loop (§4.E) until the stop token
/// is cancelled and the input channel has drained. Shared by every
/// worker kind; only the transform chain and reload handler vary.
///
/// `select!` is `biased` with the stop arm listed last, so a record
/// already queued in `input_rx` is always observed ahead of a pending
/// cancellation in the same poll — guaranteeing the drain-before-exit
/// property (§5 "no record dropped silently on cancel") without an
/// explicit two-phase shutdown handshake.
pub async fn run_ingress_loop(
    generic: &mut GenericWorker,
    transforms: Arc<TransformChain>,
    mut reload_handler: impl ReloadHandler,
) {
    loop {
        tokio::select! {
            biased;

            maybe_record = generic.input_rx.recv() => {
                let Some(mut record) = maybe_record else {
                    // Closed by every upstream sender dropping: no more
                    // input will ever arrive, equivalent to a graceful
                    // stop from this worker's perspective.
                    break;
                };

                generic.metrics.count_ingress_traffic();

                match transforms.process(&mut record) {
                    TransformOutcome::Drop => {
                        fan_out(&generic.dropped_routes, &record, &generic.name).await;
                        continue;
                    }
                    TransformOutcome::Pass => {}
                }

                if let Some(output_tx) = &generic.output_tx {
                    if output_tx.send(record.clone()).await.is_err() {
                        tracing::error!(worker = generic.name.as_str(), "logging substage is gone");
                    }
                }

                generic.metrics.count_egress_traffic();
                fan_out_forward(generic, &record).await;
            }

            maybe_snapshot = generic.reload_rx.recv() => {
                let Some(snapshot) = maybe_snapshot else {
                    continue;
                };
                transforms.reload(&snapshot.transforms);
                reload_handler.on_reload(&snapshot);
                generic.config = snapshot;
            }

            () = generic.stop_token.cancelled(), if generic.input_rx.is_empty() => {
                break;
            }
        }
    }

    // Drain whatever is still buffered after the stop token fired but
    // before we observed an empty channel (a burst landing between the
    // `is_empty` check and the cancellation future resolving).
    while let Ok(mut record) = generic.input_rx.try_recv() {
        generic.metrics.count_ingress_traffic();
        if transforms.process(&mut record) == TransformOutcome::Drop {
            fan_out(&generic.dropped_routes, &record, &generic.name).await;
            continue;
        }
        if let Some(output_tx) = &generic.output_tx {
            let _ = output_tx.send(record.clone()).await;
        }
        generic.metrics.count_egress_traffic();
        fan_out_forward(generic, &record).await;
    }

    // Only this worker ever closes its own input channel, and only
    // during its own shutdown (§3 worker entity invariant).
    generic.input_rx.close();

    if let Some(output_tx) = generic.output_tx.take() {
        drop(output_tx);
    }
}

/// A no-op sender used by tests and by sources that want an isolated
/// `mpsc::Sender` for self-feeding their own input channel (a source's
/// producer task pushes its generated records through
/// `GenericWorker::get_input_channel` the same way a peer would wire a
/// forward route into it — the dispatch loop is agnostic to whether a
/// record originated externally or from the worker's own collector).
pub fn unit_sender() -> (mpsc::Sender<DnsRecord>, mpsc::Receiver<DnsRecord>) {
    mpsc::channel(1)
}
