//! An MQTT broker sink: publishes each encoded record onto a fixed
//! topic. `rumqttc` owns its own reconnect loop internally (the
//! `EventLoop` reconnects transparently on `ConnectionError`), so this
//! worker only needs to drive the event loop and feed it encoded
//! payloads — unlike [`crate::sink::tcp::TcpSink`], which must
//! reconnect by hand.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline_core::config::ConfigSnapshot;
use pipeline_core::dispatch::{run_ingress_loop, NoopReload, PassThrough, TransformChain};
use pipeline_core::worker::{GenericWorker, RouteHandle, Worker, WorkerError, WorkerOutcome};
use pipeline_record::DnsRecord;
use pipeline_telemetry::WorkerMetrics;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::sink::format::{encode_one, SinkMode};

#[derive(Debug, thiserror::Error)]
pub enum MqttSinkError {
    #[error("`broker-host` is required for the mqtt sink")]
    MissingHost,
    #[error("`topic` is required for the mqtt sink")]
    MissingTopic,
    #[error("`mode` is required for the mqtt sink")]
    MissingMode,
    #[error("{0}")]
    UnknownMode(#[from] crate::sink::format::UnknownModeError),
}

/// `params`: `broker-host`, `topic` (required); `broker-port` (default
/// 1883), `client-id` (default `<stanza-name>`), `qos` (0/1/2, default
/// 1), `mode`, `text-format`, `delimiter`.
pub struct MqttSink {
    generic: GenericWorker,
    broker_host: String,
    broker_port: u16,
    client_id: String,
    topic: String,
    qos: QoS,
    mode: SinkMode,
    text_format: Vec<String>,
    delimiter: String,
    template: Option<String>,
}

fn qos_from_u64(n: u64) -> QoS {
    match n {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

impl MqttSink {
    pub fn new(config: ConfigSnapshot, metrics: WorkerMetrics) -> Result<Box<dyn Worker>, WorkerError> {
        let broker_host = config
            .param_str("broker-host")
            .map(str::to_string)
            .ok_or_else(|| WorkerError::Init(MqttSinkError::MissingHost.to_string()))?;
        let topic = config
            .param_str("topic")
            .map(str::to_string)
            .ok_or_else(|| WorkerError::Init(MqttSinkError::MissingTopic.to_string()))?;
        let mode: SinkMode = config
            .param_str("mode")
            .ok_or_else(|| WorkerError::Init(MqttSinkError::MissingMode.to_string()))?
            .parse()
            .map_err(|e: crate::sink::format::UnknownModeError| WorkerError::Init(e.to_string()))?;

        let broker_port = config.param_u64("broker-port").unwrap_or(1883) as u16;
        let client_id = config.param_str("client-id").unwrap_or(&config.stanza_name).to_string();
        let qos = qos_from_u64(config.param_u64("qos").unwrap_or(1));
        let text_format = config
            .param_str("text-format")
            .unwrap_or("qr identity qtype")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let delimiter = config.param_str("delimiter").unwrap_or(" ").to_string();
        let template = config.param_str("template").map(str::to_string);

        let generic = GenericWorker::new(config, metrics)?;
        Ok(Box::new(Self {
            generic,
            broker_host,
            broker_port,
            client_id,
            topic,
            qos,
            mode,
            text_format,
            delimiter,
            template,
        }))
    }
}

#[async_trait]
impl Worker for MqttSink {
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

        let mut options = MqttOptions::new(self.client_id.clone(), self.broker_host.clone(), self.broker_port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, event_loop) = AsyncClient::new(options, 64);

        let driver = tokio::spawn(drive_event_loop(name.clone(), event_loop));

        let logging = tokio::spawn(run_publishing_substage(
            name,
            output_rx,
            client,
            self.topic,
            self.qos,
            self.mode,
            self.text_format,
            self.delimiter,
            self.template,
            metrics,
        ));

        let chain = Arc::new(TransformChain::new(vec![Box::new(PassThrough)]));
        run_ingress_loop(&mut self.generic, chain, NoopReload).await;

        if let Err(error) = logging.await {
            tracing::error!(worker = self.generic.name.as_str(), %error, "publishing substage panicked");
        }
        driver.abort();
        let _ = driver.await;

        WorkerOutcome { name: self.generic.name }
    }
}

/// Polls `rumqttc`'s event loop so the client's internal reconnect and
/// keep-alive machinery keeps running; this worker has no use for the
/// incoming event stream itself (a pure publisher, no subscriptions).
async fn drive_event_loop(name: String, mut event_loop: rumqttc::EventLoop) {
    loop {
        match event_loop.poll().await {
            Ok(_event) => {}
            Err(error) => {
                tracing::warn!(worker = name.as_str(), %error, "mqtt event loop error, retrying");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_publishing_substage(
    name: String,
    mut output_rx: mpsc::Receiver<DnsRecord>,
    client: AsyncClient,
    topic: String,
    qos: QoS,
    mode: SinkMode,
    text_format: Vec<String>,
    delimiter: String,
    template: Option<String>,
    metrics: WorkerMetrics,
) {
    let text_format_refs: Vec<&str> = text_format.iter().map(String::as_str).collect();

    // Keyed on `output_rx` closing rather than the shared stop token: see
    // `file::run_line_logging` for why that's the race-free signal.
    while let Some(record) = output_rx.recv().await {
        match encode_one(&record, mode, &text_format_refs, &delimiter, template.as_deref()) {
            Ok(bytes) => {
                if let Err(error) = client.publish(&topic, qos, false, bytes).await {
                    tracing::warn!(worker = name.as_str(), %error, "mqtt publish failed");
                    metrics.count_egress_discarded(1);
                }
            }
            Err(error) => {
                tracing::error!(worker = name.as_str(), %error, "encode failed, record discarded");
                metrics.count_egress_discarded(1);
            }
        }
    }

    while let Ok(record) = output_rx.try_recv() {
        if let Ok(bytes) = encode_one(&record, mode, &text_format_refs, &delimiter, template.as_deref()) {
            let _ = client.publish(&topic, qos, false, bytes).await;
        } else {
            metrics.count_egress_discarded(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::config::{GlobalConfig, WorkerRole};
    use std::collections::HashMap;

    fn snapshot(params: &str) -> ConfigSnapshot {
        ConfigSnapshot {
            stanza_name: "mqtt".into(),
            worker_kind: "mqtt".into(),
            role: WorkerRole::Sink,
            global: GlobalConfig {
                channel_buffer_size: 16,
                flush_interval_secs: 1,
            },
            params: serde_yaml::from_str(params).unwrap(),
            transforms: HashMap::new(),
        }
    }

    #[test]
    fn missing_topic_is_rejected_at_construction() {
        let err = MqttSink::new(snapshot("broker-host: localhost\nmode: text"), WorkerMetrics::noop("mqtt")).unwrap_err();
        assert!(matches!(err, WorkerError::Init(_)));
    }

    #[test]
    fn qos_maps_expected_levels() {
        assert!(matches!(qos_from_u64(0), QoS::AtMostOnce));
        assert!(matches!(qos_from_u64(1), QoS::AtLeastOnce));
        assert!(matches!(qos_from_u64(2), QoS::ExactlyOnce));
        assert!(matches!(qos_from_u64(9), QoS::AtLeastOnce));
    }
}
