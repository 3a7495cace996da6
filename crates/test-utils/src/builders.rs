#![allow(dead_code)]

use std::path::PathBuf;

use seqrun::classify::MarkerVocabulary;
use seqrun::config::{EngineConfig, RawConfigFile};

/// Builder for `EngineConfig` to simplify test setup.
pub struct EngineConfigBuilder {
    config: RawConfigFile,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine.default_timeout_secs = secs;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.engine.working_dir = Some(dir.into());
        self
    }

    pub fn watch_output_files(mut self, on: bool) -> Self {
        self.config.engine.watch_output_files = on;
        self
    }

    pub fn tail_pattern(mut self, pattern: &str) -> Self {
        self.config.tail.patterns.push(pattern.to_string());
        self
    }

    pub fn tail_recent_secs(mut self, secs: u64) -> Self {
        self.config.tail.recent_secs = secs;
        self
    }

    pub fn classifier(mut self, vocabulary: MarkerVocabulary) -> Self {
        self.config.classifier = vocabulary;
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
