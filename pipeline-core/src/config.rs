//! The `serde_yaml` configuration tree (§6): `global`, `collectors`,
//! `loggers`, `pipelines`, plus the per-worker [`ConfigSnapshot`] the
//! assembler derives for each stanza (§4.D step 3).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

fn default_channel_buffer_size() -> usize {
    1024
}

fn default_flush_interval_secs() -> u64 {
    1
}

/// Process-wide defaults, overridable per worker via `channel-buffer-
/// size`/`flush-interval` in a stanza's `params`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    #[serde(rename = "channel-buffer-size", default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    #[serde(rename = "flush-interval", default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer_size(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingPolicy {
    #[serde(default)]
    pub forward: Vec<String>,
    #[serde(default)]
    pub dropped: Vec<String>,
}

impl RoutingPolicy {
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.dropped.is_empty()
    }
}

/// A single pipeline stanza. `params` is required to carry exactly one
/// `workerKind -> workerCfg` entry (§4.D step 3); that invariant is
/// checked by the assembler rather than by `serde`, since a zero- or
/// multi-entry map still deserializes successfully.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineStanza {
    pub name: String,
    pub params: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub transforms: HashMap<String, serde_yaml::Value>,
    #[serde(rename = "routing-policy", default)]
    pub routing_policy: RoutingPolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    /// Named collector (source) kind defaults, merged under a stanza's
    /// `params` entry of the same key before constructing the worker.
    #[serde(default)]
    pub collectors: HashMap<String, serde_yaml::Value>,
    /// Named logger (sink) kind defaults, same merge rule.
    #[serde(default)]
    pub loggers: HashMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub pipelines: Vec<PipelineStanza>,
}

impl Config {
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text)
    }
}

/// Which of the assembler's two name maps (§4.D step 4) a worker kind
/// belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    Source,
    Sink,
}

/// An isolated, per-worker configuration snapshot (§4.D step 3):
/// global defaults, this stanza's resolved worker kind and merged
/// params, and its transforms map. Delivered wholesale over
/// `reload_rx` on hot reload — never partially mutated in place.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub stanza_name: String,
    pub worker_kind: String,
    pub role: WorkerRole,
    pub global: GlobalConfig,
    pub params: serde_yaml::Value,
    pub transforms: HashMap<String, serde_yaml::Value>,
}

impl ConfigSnapshot {
    /// `effective_capacity = max(global_default, worker_override)`
    /// (§4.B). Capacity 0 is rejected by the caller, never silently
    /// coerced.
    pub fn channel_capacity(&self) -> usize {
        let worker_override = self
            .params
            .get("channel-buffer-size")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(0);
        self.global.channel_buffer_size.max(worker_override)
    }

    pub fn flush_interval(&self) -> std::time::Duration {
        let secs = self
            .params
            .get("flush-interval")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.global.flush_interval_secs);
        std::time::Duration::from_secs(secs.max(1))
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key)?.as_str()
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key)?.as_u64()
    }
}

/// Merges a named kind-default (from `collectors`/`loggers`) with a
/// stanza's own override for the same key. Mapping values are merged
/// key-by-key, override winning on conflicts; anything else is a
/// wholesale replacement.
pub fn merge_params(default: Option<&serde_yaml::Value>, override_: &serde_yaml::Value) -> serde_yaml::Value {
    match (default, override_) {
        (Some(serde_yaml::Value::Mapping(base)), serde_yaml::Value::Mapping(over)) => {
            let mut merged = base.clone();
            for (k, v) in over {
                merged.insert(k.clone(), v.clone());
            }
            serde_yaml::Value::Mapping(merged)
        }
        _ => override_.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
global:
  channel-buffer-size: 256
collectors:
  generator: {}
loggers:
  stdout: {}
pipelines:
  - name: source
    params:
      generator:
        tick-interval: 1
    routing-policy:
      forward: [sink]
  - name: sink
    params:
      stdout:
        mode: text
    routing-policy: {}
"#;

    #[test]
    fn parses_sample_config() {
        let cfg = Config::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.global.channel_buffer_size, 256);
        assert_eq!(cfg.pipelines.len(), 2);
        assert_eq!(cfg.pipelines[0].name, "source");
        assert_eq!(cfg.pipelines[0].routing_policy.forward, vec!["sink"]);
    }

    #[test]
    fn merge_prefers_override_keys() {
        let default = serde_yaml::from_str::<serde_yaml::Value>("a: 1\nb: 2").unwrap();
        let over = serde_yaml::from_str::<serde_yaml::Value>("b: 3\nc: 4").unwrap();
        let merged = merge_params(Some(&default), &over);
        assert_eq!(merged.get("a").unwrap().as_i64(), Some(1));
        assert_eq!(merged.get("b").unwrap().as_i64(), Some(3));
        assert_eq!(merged.get("c").unwrap().as_i64(), Some(4));
    }

    #[test]
    fn channel_capacity_takes_the_max() {
        let snapshot = ConfigSnapshot {
            stanza_name: "s".into(),
            worker_kind: "generator".into(),
            role: WorkerRole::Source,
            global: GlobalConfig {
                channel_buffer_size: 100,
                flush_interval_secs: 1,
            },
            params: serde_yaml::from_str("channel-buffer-size: 50").unwrap(),
            transforms: HashMap::new(),
        };
        assert_eq!(snapshot.channel_capacity(), 100);

        let snapshot2 = ConfigSnapshot {
            params: serde_yaml::from_str("channel-buffer-size: 500").unwrap(),
            ..snapshot
        };
        assert_eq!(snapshot2.channel_capacity(), 500);
    }
}
