//! Exercises the full stack — YAML config, assembler, routing graph,
//! `PipelineController`, dispatch loop, and a concrete source/sink pair —
//! together, rather than unit-testing each in isolation. Grounded on
//! §8's universal properties (routing closure, no silent forward drop)
//! and Scenario A/F, but driven through `pipeline_core::assemble` the
//! way `pipeline-cli::main` actually wires a deployment.

use std::time::Duration;

use pipeline_core::assembler::assemble;
use pipeline_core::config::Config;
use pipeline_core::control::PipelineController;
use pipeline_telemetry::TelemetryHub;

#[tokio::test]
async fn generator_to_file_sink_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");

    let yaml = format!(
        r#"
global:
  channel-buffer-size: 64
collectors:
  generator: {{}}
loggers:
  stdout: {{}}
pipelines:
  - name: source
    params:
      generator:
        tick-interval-ms: 2
        qname-prefix: e2e
    routing-policy:
      forward: [sink]
  - name: sink
    params:
      stdout:
        file-path: {}
        mode: text
        text-format: qname
    routing-policy: {{}}
"#,
        path.display()
    );

    let config = Config::from_str(&yaml).unwrap();
    let factory = pipeline_workers::default_factory_table();
    let telemetry = TelemetryHub::new();
    let pipeline = assemble(&config, &factory, &telemetry).unwrap();

    assert_eq!(pipeline.sources.len(), 1);
    assert_eq!(pipeline.sinks.len(), 1);

    let controller = PipelineController::spawn(pipeline);
    tokio::time::sleep(Duration::from_millis(150)).await;
    controller.shutdown().await;

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert!(!lines.is_empty(), "expected at least one line forwarded end-to-end, got none");
    assert!(lines.iter().all(|l| l.starts_with("e2e-")), "every line should carry the configured qname prefix: {lines:?}");
}

#[tokio::test]
async fn rejects_a_config_with_no_routes_defined() {
    let yaml = r#"
collectors:
  generator: {}
loggers:
  stdout: {}
pipelines:
  - name: source
    params:
      generator: {}
    routing-policy: {}
  - name: sink
    params:
      stdout:
        file-path: /tmp/unused.log
        mode: text
    routing-policy: {}
"#;
    let config = Config::from_str(yaml).unwrap();
    let factory = pipeline_workers::default_factory_table();
    let telemetry = TelemetryHub::new();
    let err = assemble(&config, &factory, &telemetry).unwrap_err();
    assert!(matches!(err, pipeline_core::assembler::AssemblyError::Graph(_)));
}
