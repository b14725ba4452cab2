//! Process-wide metrics collaborator for the pipeline runtime.
//!
//! Counters are process-wide `opentelemetry` instruments (internally
//! atomic); the buffer pool and config snapshot stay per-worker, as the
//! concurrency model requires. [`TelemetryHub`] is constructed once in
//! `pipeline-cli::main` and threaded down explicitly — nothing in
//! `pipeline-core` reaches for a global singleton.

use opentelemetry::metrics::Counter;
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;

/// Owns the meter provider and mints per-worker [`WorkerMetrics`].
///
/// No reader is attached: this workspace's scope stops at recording the
/// counters (§4.G), not at shipping them to a particular backend. A
/// binary that wants OTLP/Prometheus export attaches a reader to the
/// `SdkMeterProvider` before calling [`TelemetryHub::new`]'s
/// equivalent, or swaps in `TelemetryHub::with_provider`.
pub struct TelemetryHub {
    provider: SdkMeterProvider,
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self {
            provider: SdkMeterProvider::builder().build(),
        }
    }

    pub fn with_provider(provider: SdkMeterProvider) -> Self {
        Self { provider }
    }

    /// Builds the four counters a [`crate::WorkerMetrics`] exposes, each
    /// tagged with `worker_name` so a single process-wide meter can
    /// distinguish instances.
    pub fn worker_metrics(&self, worker_name: &str) -> WorkerMetrics {
        let meter = self.provider.meter("pipeline");
        let tag = KeyValue::new("worker_name", worker_name.to_string());

        WorkerMetrics {
            tag,
            ingress: meter
                .u64_counter("pipeline_ingress_total")
                .with_description("Records read off a worker's input channel")
                .init(),
            egress: meter
                .u64_counter("pipeline_egress_total")
                .with_description("Records forwarded to a worker's forward routes")
                .init(),
            egress_discarded: meter
                .u64_counter("pipeline_egress_discarded_total")
                .with_description("Records dropped due to encode/IO errors in a sink")
                .init(),
            dropped_on_full: meter
                .u64_counter("pipeline_dropped_on_full_total")
                .with_description("Records sent down a dropped route (transform marked drop)")
                .init(),
        }
    }

    pub fn provider(&self) -> &SdkMeterProvider {
        &self.provider
    }
}

/// Per-worker counters, matching §4.E/§7's required counter set.
///
/// Cheap to clone: each field is an `opentelemetry::metrics::Counter`,
/// itself a thin `Arc` around the provider's internal atomic state.
#[derive(Clone)]
pub struct WorkerMetrics {
    tag: KeyValue,
    ingress: Counter<u64>,
    egress: Counter<u64>,
    egress_discarded: Counter<u64>,
    dropped_on_full: Counter<u64>,
}

impl WorkerMetrics {
    /// A metrics instance that records nowhere; useful for unit tests
    /// that construct a worker without a full [`TelemetryHub`].
    pub fn noop(worker_name: &str) -> Self {
        TelemetryHub::new().worker_metrics(worker_name)
    }

    pub fn count_ingress_traffic(&self) {
        self.ingress.add(1, std::slice::from_ref(&self.tag));
    }

    pub fn count_egress_traffic(&self) {
        self.egress.add(1, std::slice::from_ref(&self.tag));
    }

    pub fn count_egress_discarded(&self, n: u64) {
        self.egress_discarded.add(n, std::slice::from_ref(&self.tag));
    }

    pub fn count_dropped_on_full(&self) {
        self.dropped_on_full.add(1, std::slice::from_ref(&self.tag));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_do_not_panic_without_a_reader() {
        let hub = TelemetryHub::new();
        let metrics = hub.worker_metrics("test-worker");
        metrics.count_ingress_traffic();
        metrics.count_egress_traffic();
        metrics.count_egress_discarded(3);
        metrics.count_dropped_on_full();
    }

    #[test]
    fn noop_metrics_are_usable_standalone() {
        let metrics = WorkerMetrics::noop("standalone");
        metrics.count_ingress_traffic();
    }
}
