// src/config/validate.rs

use crate::config::model::{EngineConfig, RawConfigFile};
use crate::errors::{EngineError, Result};
use crate::watch::TailSettings;

impl TryFrom<RawConfigFile> for EngineConfig {
    type Error = EngineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(EngineConfig::new_unchecked(raw))
    }
}

/// Check an already-built config, e.g. one assembled in code rather than
/// loaded from TOML.
pub fn validate_config(cfg: &EngineConfig) -> Result<()> {
    validate_engine_section(cfg)?;
    validate_tail_section(cfg)?;
    Ok(())
}

fn validate_raw_config(raw: &RawConfigFile) -> Result<()> {
    validate_config(&EngineConfig::new_unchecked(raw.clone()))
}

fn validate_engine_section(cfg: &EngineConfig) -> Result<()> {
    if cfg.engine.default_timeout_secs == 0 {
        return Err(EngineError::Config(
            "[engine].default_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.engine.max_parallel == 0 {
        return Err(EngineError::Config(
            "[engine].max_parallel must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.engine.python.trim().is_empty() {
        return Err(EngineError::Config(
            "[engine].python must not be empty".to_string(),
        ));
    }

    if let Some(dir) = &cfg.engine.working_dir {
        if !dir.is_dir() {
            return Err(EngineError::Config(format!(
                "[engine].working_dir '{}' is not an existing directory",
                dir.display()
            )));
        }
    }

    Ok(())
}

fn validate_tail_section(cfg: &EngineConfig) -> Result<()> {
    // Compiled only to surface pattern errors early.
    TailSettings::new(&cfg.tail.patterns, cfg.tail_recent()).map(|_| ())
}
