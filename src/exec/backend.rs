// src/exec/backend.rs

//! Pluggable execution backend abstraction.
//!
//! The dispatcher hands each claimed job to an `ExecutionBackend` and awaits
//! it before dequeuing the next one. Production uses
//! [`ProcessController`](super::ProcessController); tests can provide a fake
//! backend that writes output into the registry without spawning processes.
//!
//! Backends only report *how* a run ended. Turning that into a terminal
//! status, a verdict and a callback is the dispatcher's job, so every backend
//! gets identical last-writer-wins handling.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::Timings;
use crate::exec::tree::ProcessTreeControl;
use crate::registry::{Params, TaskRegistry};

/// A claimed execution, ready to run.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub script_path: PathBuf,
    pub params: Params,
    /// Wall-clock budget measured from `started`. Not extended while paused.
    pub timeout: Duration,
    pub started: Instant,
}

impl Job {
    pub fn deadline(&self) -> Instant {
        self.started + self.timeout
    }
}

/// How a run ended, as observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited on its own; `None` when killed by a signal.
    Exited(Option<i32>),
    /// The process could not be created.
    SpawnFailed(String),
    /// The watchdog fired and the process was terminated.
    TimedOut,
    /// A cancel was observed and the process was terminated.
    Cancelled,
}

/// Shared engine pieces a backend may use while running a job.
#[derive(Clone)]
pub struct RunContext {
    pub registry: Arc<TaskRegistry>,
    pub tree: Arc<dyn ProcessTreeControl>,
    pub timings: Timings,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

/// Trait abstracting how a single job is executed.
pub trait ExecutionBackend: Send + Sync {
    /// Run `job` to completion (or cancellation/timeout).
    ///
    /// The returned future must resolve only once the job no longer occupies
    /// the hardware; the dispatcher relies on that for sequential execution.
    fn run<'a>(
        &'a self,
        job: Job,
        ctx: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = RunOutcome> + Send + 'a>>;
}
