use serde::Deserialize;

use crate::error::EngineError;

/// Root configuration, parsed from TOML and layered the way
/// `gauss_engine::config::GaussConfig::load` reads a single file —
/// generalised here to merge two optional override layers on top of
/// built-in defaults (§6: `OS2DS_ENGINE_SYSTEM_CONFIG_PATH` /
/// `OS2DS_ENGINE_USER_CONFIG_PATH`).
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Prefetch depth for every queue (§5 "queue I/O at stage boundaries",
    /// default 8).
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,

    /// Number of single-threaded worker tasks per pipeline stage (§5
    /// "parallelism is horizontal across workers").
    #[serde(default = "default_workers")]
    pub explorer_workers: usize,
    #[serde(default = "default_workers")]
    pub processor_workers: usize,
    #[serde(default = "default_workers")]
    pub matcher_workers: usize,
    #[serde(default = "default_workers")]
    pub tagger_workers: usize,
    #[serde(default = "default_workers")]
    pub exporter_workers: usize,

    /// Queue names (§6), overridable per deployment.
    #[serde(default)]
    pub queues: QueueNames,

    /// Where the exporter sinks terminal events (§4.H Exporter); `"stdout"`
    /// when unset, matching the demo-friendly default every other stage
    /// uses for tracing output.
    #[serde(default)]
    pub export_sink: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueNames {
    #[serde(default = "q_scan_specs")]
    pub scan_specs: String,
    #[serde(default = "q_conversions")]
    pub conversions: String,
    #[serde(default = "q_matches")]
    pub matches: String,
    #[serde(default = "q_metadata")]
    pub metadata: String,
    #[serde(default = "q_problems")]
    pub problems: String,
    #[serde(default = "q_status")]
    pub status: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            scan_specs: q_scan_specs(),
            conversions: q_conversions(),
            matches: q_matches(),
            metadata: q_metadata(),
            problems: q_problems(),
            status: q_status(),
        }
    }
}

fn q_scan_specs() -> String {
    scan_messages::queues::SCAN_SPECS.to_string()
}
fn q_conversions() -> String {
    scan_messages::queues::CONVERSIONS.to_string()
}
fn q_matches() -> String {
    scan_messages::queues::MATCHES.to_string()
}
fn q_metadata() -> String {
    scan_messages::queues::METADATA.to_string()
}
fn q_problems() -> String {
    scan_messages::queues::PROBLEMS.to_string()
}
fn q_status() -> String {
    scan_messages::queues::STATUS.to_string()
}

fn default_prefetch() -> usize {
    8
}

fn default_workers() -> usize {
    1
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            prefetch: default_prefetch(),
            explorer_workers: default_workers(),
            processor_workers: default_workers(),
            matcher_workers: default_workers(),
            tagger_workers: default_workers(),
            exporter_workers: default_workers(),
            queues: QueueNames::default(),
            export_sink: None,
        }
    }
}

impl ScanConfig {
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }

    fn load_layer(path: &str) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Loads built-in defaults, then layers `OS2DS_ENGINE_SYSTEM_CONFIG_PATH`
    /// and `OS2DS_ENGINE_USER_CONFIG_PATH` on top, in that order, if set and
    /// the files exist (§6). Every field carries a `#[serde(default)]`, so a
    /// layer file only needs to mention the keys it overrides; whichever
    /// layer loads last replaces the whole config, with its own omitted
    /// fields falling back to the built-in defaults rather than the
    /// previous layer's values.
    pub fn load_layered() -> Result<Self, EngineError> {
        let mut config = Self::default();
        for var in ["OS2DS_ENGINE_SYSTEM_CONFIG_PATH", "OS2DS_ENGINE_USER_CONFIG_PATH"] {
            if let Ok(path) = std::env::var(var) {
                if std::path::Path::new(&path).exists() {
                    config = Self::load_layer(&path)?;
                    tracing::info!(path, layer = var, "loaded configuration layer");
                }
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_queue_names() {
        let config = ScanConfig::default();
        assert_eq!(config.queues.scan_specs, "os2ds_scan_specs");
        assert_eq!(config.prefetch, 8);
    }

    #[test]
    fn parses_a_partial_toml_override() {
        let config = ScanConfig::parse("prefetch = 16\n").unwrap();
        assert_eq!(config.prefetch, 16);
        assert_eq!(config.queues.matches, "os2ds_matches");
    }
}
