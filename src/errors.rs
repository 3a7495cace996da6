// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Steady-state engine operations report failures through record statuses,
//! not through this type. `EngineError` surfaces at construction time
//! (configuration, runtime wiring) and inside the process-control layer,
//! where the caller decides whether a failure is fatal or merely logged.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Process control failed for pid {pid}: {message}")]
    ProcessControl { pid: u32, message: String },

    #[error("Process {0} already exited")]
    ProcessAlreadyExited(u32),

    #[error("Engine must be constructed inside a Tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// `true` for the benign "target vanished between decide and act" race.
    pub fn is_already_exited(&self) -> bool {
        matches!(self, EngineError::ProcessAlreadyExited(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
