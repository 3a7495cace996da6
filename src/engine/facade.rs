// src/engine/facade.rs

//! The public engine facade.
//!
//! Construction starts the dispatcher on the ambient Tokio runtime. After
//! that no operation fails: unknown ids yield `false`, an empty output or an
//! `Unknown` snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::classify::{KeywordClassifier, ResultClassifier};
use crate::config::{validate_config, ConfigProvider, EngineConfig};
use crate::engine::control;
use crate::engine::dispatcher::run_dispatcher;
use crate::engine::monitor::run_batch_monitor;
use crate::engine::state::{invoke_callback, EngineState};
use crate::engine::Timings;
use crate::errors::{EngineError, Result};
use crate::exec::{
    platform_tree_control, ExecutionBackend, LaunchSpec, ProcessController, ProcessTreeControl,
    RunContext, TailWiring,
};
use crate::fs::RealFileSystem;
use crate::registry::{
    Batch, BatchCallback, Execution, ExecutionCallback, ExecutionSnapshot, Params,
    RecordSnapshot, TaskRegistry,
};
use crate::types::Status;
use crate::watch::TailSettings;

const WAIT_POLL: Duration = Duration::from_millis(20);

/// Optional replacements for the engine's collaborators.
///
/// Anything left as `None` gets the production implementation.
#[derive(Default)]
pub struct EngineParts {
    pub backend: Option<Arc<dyn ExecutionBackend>>,
    pub tree: Option<Arc<dyn ProcessTreeControl>>,
    pub classifier: Option<Arc<dyn ResultClassifier>>,
    /// Overrides `[engine].default_timeout_secs` when present.
    pub config_provider: Option<Arc<dyn ConfigProvider + Send + Sync>>,
    pub timings: Timings,
}

/// Sequential script execution engine.
///
/// Dropping the engine shuts it down.
pub struct Engine {
    state: Arc<EngineState>,
    runtime: Handle,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine with the production backend. Must be called from
    /// within a Tokio runtime.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Self::with_parts(config, EngineParts::default())
    }

    pub fn with_parts(config: &EngineConfig, parts: EngineParts) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        validate_config(config)?;

        let timeout_secs = match &parts.config_provider {
            Some(provider) => match provider.default_timeout_secs() {
                0 => {
                    warn!("config provider returned a zero timeout; using configured default");
                    config.default_timeout_secs()
                }
                secs => secs,
            },
            None => config.default_timeout_secs(),
        };
        if config.engine.max_parallel != 1 {
            warn!(
                requested = config.engine.max_parallel,
                "only sequential execution is supported; running one script at a time"
            );
        }

        let backend: Arc<dyn ExecutionBackend> = match parts.backend {
            Some(backend) => backend,
            None => Arc::new(process_controller(config)?),
        };
        let classifier: Arc<dyn ResultClassifier> = match parts.classifier {
            Some(classifier) => classifier,
            None => Arc::new(KeywordClassifier::with_extra(config.classifier.clone())),
        };
        let tree = parts.tree.unwrap_or_else(platform_tree_control);

        let ctx = RunContext {
            registry: Arc::new(TaskRegistry::new()),
            tree,
            timings: parts.timings,
        };
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let state = Arc::new(EngineState::new(
            ctx,
            backend,
            classifier,
            queue_tx,
            timeout_secs,
        ));

        runtime.spawn(run_dispatcher(state.clone(), queue_rx));
        info!(timeout_secs, "engine started");

        Ok(Self { state, runtime })
    }

    /// Queue one script. Returns its execution id.
    pub fn enqueue_script(
        &self,
        script_path: impl Into<PathBuf>,
        params: Params,
        on_complete: Option<ExecutionCallback>,
        batch_id: Option<&str>,
    ) -> String {
        let id = self.state.registry.ids().execution_id();
        let exec = Execution::new(
            id.clone(),
            script_path.into(),
            params,
            batch_id.map(str::to_string),
            on_complete,
        );
        self.admit(exec);
        id
    }

    /// Queue several scripts as one batch, in order, sharing `params`.
    /// Returns the batch id.
    pub fn enqueue_batch<I, P>(
        &self,
        script_paths: I,
        params: Params,
        on_complete: Option<BatchCallback>,
    ) -> String
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let ids = self.state.registry.ids();
        let batch_id = ids.batch_id();
        let members: Vec<Execution> = script_paths
            .into_iter()
            .map(|path| {
                Execution::new(
                    ids.execution_id(),
                    path.into(),
                    params.clone(),
                    Some(batch_id.clone()),
                    None,
                )
            })
            .collect();
        let member_ids = members.iter().map(|e| e.id.clone()).collect::<Vec<_>>();

        self.state
            .registry
            .put_batch(Batch::new(batch_id.clone(), member_ids, on_complete));
        let count = members.len();
        for exec in members {
            self.admit(exec);
        }
        self.runtime
            .spawn(run_batch_monitor(self.state.clone(), batch_id.clone()));

        info!(batch = %batch_id, members = count, "batch queued");
        batch_id
    }

    fn admit(&self, mut exec: Execution) {
        let id = exec.id.clone();
        if self.state.is_running() {
            self.state.registry.put_execution(exec);
            if self.state.enqueue(id.clone()) {
                debug!(execution = %id, "execution queued");
                return;
            }
            // Dispatcher already gone.
            control::cancel_execution(&self.state, &id);
            let settled = self.state.registry.update(&id, |e| {
                e.on_complete.take().map(|cb| (cb, e.snapshot()))
            });
            if let Some(Some((callback, snapshot))) = settled {
                invoke_callback("execution", &id, callback.as_ref(), &snapshot);
            }
            return;
        }

        warn!(execution = %id, "engine is shut down; execution cancelled");
        control::mark_cancelled(&mut exec);
        exec.error = Some("engine is shut down".to_string());
        let settled = exec.on_complete.take().map(|cb| (cb, exec.snapshot()));
        self.state.registry.put_execution(exec);
        if let Some((callback, snapshot)) = settled {
            invoke_callback("execution", &id, callback.as_ref(), &snapshot);
        }
    }

    /// Cancel an execution, or every in-flight member of a batch. Returns
    /// `true` if anything was cancelled.
    pub fn cancel(&self, id: &str) -> bool {
        match self.state.registry.batch_members(id) {
            Some(members) => {
                let mut any = false;
                for member in members {
                    any |= control::cancel_execution(&self.state, &member);
                }
                if any {
                    info!(batch = %id, "batch cancelled");
                }
                any
            }
            None => control::cancel_execution(&self.state, id),
        }
    }

    /// Cancel and wait until the affected processes are gone.
    pub async fn cancel_now(&self, id: &str) -> bool {
        let targets = self
            .state
            .registry
            .batch_members(id)
            .unwrap_or_else(|| vec![id.to_string()]);
        if !self.cancel(id) {
            return false;
        }

        let t = self.state.timings();
        let limit = t.terminate_grace * 3 + t.drain_limit + t.dequeue_wait;
        let started = Instant::now();
        while targets.iter().any(|m| self.state.is_active(m)) {
            if started.elapsed() >= limit {
                warn!(id, "cancelled execution still shutting down");
                break;
            }
            sleep(WAIT_POLL).await;
        }
        true
    }

    /// Pause an execution or a batch. Pending targets are paused at once;
    /// suspending a running process happens in the background.
    pub fn pause(&self, id: &str) -> bool {
        let Some(targets) = control::begin_pause(&self.state, id) else {
            return false;
        };
        if !targets.is_empty() {
            let state = self.state.clone();
            self.runtime.spawn(async move {
                control::suspend_all(&state, targets).await;
            });
        }
        true
    }

    /// Like [`pause`](Self::pause), but waits for the OS action and reports
    /// whether it succeeded.
    pub async fn pause_now(&self, id: &str) -> bool {
        match control::begin_pause(&self.state, id) {
            Some(targets) => control::suspend_all(&self.state, targets).await,
            None => false,
        }
    }

    pub fn resume(&self, id: &str) -> bool {
        let Some(targets) = control::begin_resume(&self.state, id) else {
            return false;
        };
        if !targets.is_empty() {
            let state = self.state.clone();
            self.runtime.spawn(async move {
                control::resume_all(&state, targets).await;
            });
        }
        true
    }

    pub async fn resume_now(&self, id: &str) -> bool {
        match control::begin_resume(&self.state, id) {
            Some(targets) => control::resume_all(&self.state, targets).await,
            None => false,
        }
    }

    /// Cancel whichever execution currently holds the hardware: the active
    /// member of a batch, or the execution itself when given an execution id.
    /// Pending members are left queued.
    pub fn skip_current(&self, id: &str) -> bool {
        let current = self.state.registry.with_records(|r| {
            let holds_process = |m: &str| match r.execution(m).map(|e| e.status) {
                Some(Status::Running) => true,
                Some(Status::Paused) => r.process(m).is_some(),
                _ => false,
            };
            match r.batch(id) {
                Some(batch) => batch.execution_ids().iter().find(|m| holds_process(m)).cloned(),
                None => holds_process(id).then(|| id.to_string()),
            }
        });

        match current {
            Some(execution) => {
                info!(target_id = %id, execution = %execution, "skipping current execution");
                control::cancel_execution(&self.state, &execution)
            }
            None => {
                debug!(target_id = %id, "nothing running to skip");
                false
            }
        }
    }

    pub fn get_status(&self, id: &str) -> RecordSnapshot {
        self.state.registry.snapshot(id)
    }

    /// Output of an execution, or the members' outputs concatenated for a
    /// batch.
    pub fn get_output(&self, id: &str) -> Vec<String> {
        self.state.registry.output(id)
    }

    /// Every execution in creation order.
    pub fn list(&self) -> Vec<ExecutionSnapshot> {
        self.state.registry.list()
    }

    /// Change the timeout for executions claimed from now on.
    pub fn set_timeout(&self, secs: u64) {
        if secs == 0 {
            warn!("ignoring zero timeout");
            return;
        }
        self.state.set_timeout_secs(secs);
        info!(timeout_secs = secs, "default timeout updated");
    }

    pub fn effective_timeout(&self) -> Duration {
        self.state.timeout()
    }

    /// Accepted for compatibility; execution stays sequential.
    pub fn set_max_parallel(&self, n: usize) {
        if n != 1 {
            warn!(requested = n, "only sequential execution is supported; ignoring");
        }
    }

    pub fn max_parallel(&self) -> usize {
        1
    }

    /// Stop the dispatcher and cancel everything not yet finished.
    /// Idempotent.
    pub fn shutdown(&self) {
        if !self.state.stop() {
            return;
        }
        let ids = self.state.registry.execution_ids();
        let cancelled = ids
            .iter()
            .filter(|id| control::cancel_execution(&self.state, id))
            .count();
        info!(cancelled, "engine shut down");
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Wait until `id` reaches a terminal status and is no longer held by
    /// the dispatcher, or `limit` elapses. Returns the last snapshot.
    pub async fn wait_for(&self, id: &str, limit: Duration) -> RecordSnapshot {
        let started = Instant::now();
        loop {
            let snapshot = self.get_status(id);
            let status = snapshot.status();
            let settled = status == Status::Unknown
                || (status.is_terminal() && !self.state.is_active(id));
            if settled || started.elapsed() >= limit {
                return snapshot;
            }
            sleep(WAIT_POLL).await;
        }
    }

    /// Wait until every known execution is settled. Returns `false` on
    /// timeout.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let started = Instant::now();
        loop {
            let idle = !self.state.any_active()
                && self.list().iter().all(|e| e.status.is_terminal());
            if idle {
                return true;
            }
            if started.elapsed() >= limit {
                return false;
            }
            sleep(WAIT_POLL).await;
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn process_controller(config: &EngineConfig) -> Result<ProcessController> {
    let launch = LaunchSpec {
        python: config.engine.python.clone(),
        working_dir: config.engine.working_dir.clone(),
    };
    let tail = if config.engine.watch_output_files {
        Some(TailWiring {
            fs: Arc::new(RealFileSystem),
            settings: TailSettings::new(&config.tail.patterns, config.tail_recent())?,
        })
    } else {
        None
    };
    Ok(ProcessController::new(launch, tail))
}
