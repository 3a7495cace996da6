// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::classify::MarkerVocabulary;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [engine]
/// default_timeout_secs = 300
/// max_parallel = 1
/// working_dir = "."
/// watch_output_files = false
/// python = "python3"
///
/// [tail]
/// patterns = ["*.txt", "*.log"]
/// recent_secs = 60
///
/// [classifier]
/// pass = ["OK"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub tail: TailSection,

    /// Extra markers merged into the built-in vocabularies.
    #[serde(default)]
    pub classifier: MarkerVocabulary,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Per-execution wall-clock limit for newly claimed executions.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Accepted for compatibility; the engine always runs one script at a
    /// time.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Working directory for every script. If `None`, each script runs in
    /// its own directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Tail `.txt`/`.log` files written next to the script.
    #[serde(default)]
    pub watch_output_files: bool,

    /// Interpreter used for `.py` scripts.
    #[serde(default = "default_python")]
    pub python: String,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_parallel() -> usize {
    1
}

fn default_python() -> String {
    crate::exec::command::default_python().to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_parallel: default_max_parallel(),
            working_dir: None,
            watch_output_files: false,
            python: default_python(),
        }
    }
}

/// `[tail]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TailSection {
    #[serde(default = "default_tail_patterns")]
    pub patterns: Vec<String>,

    /// Only files modified within this many seconds are picked up.
    #[serde(default = "default_recent_secs")]
    pub recent_secs: u64,
}

fn default_tail_patterns() -> Vec<String> {
    vec!["*.txt".to_string(), "*.log".to_string()]
}

fn default_recent_secs() -> u64 {
    60
}

impl Default for TailSection {
    fn default() -> Self {
        Self {
            patterns: default_tail_patterns(),
            recent_secs: default_recent_secs(),
        }
    }
}

/// Validated configuration.
///
/// Only constructed via `TryFrom<RawConfigFile>` (or `Default`), so the
/// invariants checked in `validate.rs` hold for every instance built from a
/// file. Fields stay public so tests and embedders can adjust them.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub engine: EngineSection,
    pub tail: TailSection,
    pub classifier: MarkerVocabulary,
}

impl EngineConfig {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            engine: raw.engine,
            tail: raw.tail,
            classifier: raw.classifier,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.default_timeout_secs)
    }

    pub fn tail_recent(&self) -> Duration {
        Duration::from_secs(self.tail.recent_secs)
    }
}

/// Source of the default per-execution timeout.
///
/// Read once at engine construction; `Engine::set_timeout` overrides it
/// afterwards.
pub trait ConfigProvider {
    fn default_timeout_secs(&self) -> u64;
}

impl ConfigProvider for EngineConfig {
    fn default_timeout_secs(&self) -> u64 {
        self.engine.default_timeout_secs
    }
}
