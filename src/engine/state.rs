// src/engine/state.rs

//! State shared between the facade, the dispatcher and the batch monitors.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::error;

use crate::classify::ResultClassifier;
use crate::engine::Timings;
use crate::exec::{ExecutionBackend, RunContext};
use crate::registry::TaskRegistry;

pub struct EngineState {
    pub registry: Arc<TaskRegistry>,
    pub ctx: RunContext,
    pub backend: Arc<dyn ExecutionBackend>,
    pub classifier: Arc<dyn ResultClassifier>,
    queue: UnboundedSender<String>,
    running: AtomicBool,
    timeout_secs: AtomicU64,
    /// Execution currently handed to the backend.
    active: Mutex<Option<String>>,
}

impl std::fmt::Debug for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineState")
            .field("running", &self.is_running())
            .field("timeout_secs", &self.timeout_secs.load(Ordering::Relaxed))
            .field("timings", &self.ctx.timings)
            .finish_non_exhaustive()
    }
}

impl EngineState {
    pub fn new(
        ctx: RunContext,
        backend: Arc<dyn ExecutionBackend>,
        classifier: Arc<dyn ResultClassifier>,
        queue: UnboundedSender<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            registry: ctx.registry.clone(),
            ctx,
            backend,
            classifier,
            queue,
            running: AtomicBool::new(true),
            timeout_secs: AtomicU64::new(timeout_secs),
            active: Mutex::new(None),
        }
    }

    pub fn timings(&self) -> &Timings {
        &self.ctx.timings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag. Returns `false` if it was already cleared.
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    /// Timeout applied to the next claimed execution.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.load(Ordering::Relaxed))
    }

    pub fn set_timeout_secs(&self, secs: u64) {
        self.timeout_secs.store(secs, Ordering::Relaxed);
    }

    /// Push an id onto the FIFO queue. Fails once the dispatcher is gone.
    pub fn enqueue(&self, id: String) -> bool {
        self.queue.send(id).is_ok()
    }

    pub fn set_active(&self, id: Option<String>) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = id;
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(id)
    }

    pub fn any_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Run a completion callback, containing any panic it raises.
pub fn invoke_callback<T: ?Sized>(
    kind: &'static str,
    id: &str,
    callback: &(dyn Fn(&T) + Send + Sync),
    arg: &T,
) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(arg))) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(kind, id, panic = %message, "completion callback panicked");
    }
}
