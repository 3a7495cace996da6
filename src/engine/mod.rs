// src/engine/mod.rs

//! Sequential execution engine.
//!
//! This module ties together:
//! - the FIFO queue and its single dispatcher worker
//! - one batch monitor per batch
//! - pause / resume / cancel actions against live process trees
//! - the public [`Engine`] facade
//!
//! The pure decision rules live in [`core`]; the async shells are
//! implemented in [`dispatcher`] and [`monitor`].

use std::time::Duration;

pub mod control;
pub mod core;
pub mod dispatcher;
pub mod facade;
pub mod monitor;
pub mod state;

pub use facade::{Engine, EngineParts};

/// Polling intervals and grace periods used across the engine.
///
/// Tests shrink these to keep wall-clock time down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// How long the dispatcher blocks on an empty queue before re-checking
    /// the running flag.
    pub dequeue_wait: Duration,
    /// Sleep after requeueing a paused item.
    pub paused_backoff: Duration,
    /// Sleep between streaming-loop iterations with no output.
    pub idle_sleep: Duration,
    /// Consecutive idle iterations before probing whether the process exited.
    pub idle_polls_before_exit_check: u32,
    pub monitor_interval: Duration,
    pub tail_interval: Duration,
    /// Wait after each termination escalation step.
    pub terminate_grace: Duration,
    /// Upper bound on collecting buffered output after exit.
    pub drain_limit: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            dequeue_wait: Duration::from_secs(1),
            paused_backoff: Duration::from_millis(500),
            idle_sleep: Duration::from_millis(10),
            idle_polls_before_exit_check: 100,
            monitor_interval: Duration::from_secs(1),
            tail_interval: Duration::from_millis(500),
            terminate_grace: Duration::from_secs(1),
            drain_limit: Duration::from_secs(2),
        }
    }
}
