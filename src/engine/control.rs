// src/engine/control.rs

//! Pause, resume and cancel.
//!
//! Every action follows the same shape: decide under the registry lock,
//! release it, act on the OS process tree (on a blocking thread), then
//! re-acquire the lock to record the result. The paused set is only updated
//! after the OS action succeeded.
//!
//! Pending executions need no OS work: pausing one only flips its status so
//! the dispatcher keeps requeueing it.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::engine::state::EngineState;
use crate::registry::{Execution, ProcessHandle};
use crate::types::{Status, TestResult};

/// A running execution whose process tree must be acted on.
pub type ProcessTarget = (String, ProcessHandle);

/// Record a cancellation on an execution. The caller holds the lock.
pub fn mark_cancelled(exec: &mut Execution) {
    exec.status = Status::Cancelled;
    if exec.test_result.is_none() {
        exec.test_result = Some(TestResult::Pending);
    }
    if exec.end_time.is_none() {
        exec.end_time = Some(Utc::now());
    }
}

/// Cancel one execution. A running process is terminated by its controller,
/// which notices the status change within one polling interval.
pub fn cancel_execution(state: &EngineState, id: &str) -> bool {
    let previous = state.registry.with_records(|r| {
        let exec = r.execution_mut(id)?;
        if !exec.status.is_in_flight() {
            return None;
        }
        let previous = exec.status;
        mark_cancelled(exec);
        Some(previous)
    });

    match previous {
        Some(previous) => {
            state.registry.clear_paused(id);
            info!(execution = %id, from = %previous, "execution cancelled");
            true
        }
        None => {
            debug!(execution = %id, "cancel ignored; execution not in flight");
            false
        }
    }
}

enum PausePlan {
    Logical,
    Suspend(ProcessHandle),
}

fn plan_pause(state: &EngineState, id: &str) -> Option<PausePlan> {
    let plan = state.registry.with_records(|r| {
        let status = r.execution(id)?.status;
        match status {
            Status::Pending => {
                r.execution_mut(id)?.status = Status::Paused;
                Some(PausePlan::Logical)
            }
            Status::Running => r.process(id).map(PausePlan::Suspend),
            _ => None,
        }
    });
    if matches!(plan, Some(PausePlan::Logical)) {
        state.registry.mark_paused(id);
        info!(execution = %id, "pending execution paused");
    }
    plan
}

/// Logical half of a pause. Pending targets are paused in place; running
/// ones are returned for the caller to suspend. `None` if nothing is
/// pausable under `id`.
pub fn begin_pause(state: &EngineState, id: &str) -> Option<Vec<ProcessTarget>> {
    if let Some(members) = state.registry.batch_members(id) {
        let accepted = state
            .registry
            .update_batch(id, |b| {
                if b.status.is_terminal() {
                    return false;
                }
                b.status = Status::Paused;
                true
            })
            .unwrap_or(false);
        if !accepted {
            return None;
        }
        info!(batch = %id, "batch paused");
        let targets = members
            .into_iter()
            .filter_map(|m| match plan_pause(state, &m)? {
                PausePlan::Suspend(h) => Some((m, h)),
                PausePlan::Logical => None,
            })
            .collect();
        return Some(targets);
    }

    match plan_pause(state, id)? {
        PausePlan::Logical => Some(Vec::new()),
        PausePlan::Suspend(h) => Some(vec![(id.to_string(), h)]),
    }
}

/// Suspend each target's process tree. Returns `true` if all succeeded.
pub async fn suspend_all(state: &EngineState, targets: Vec<ProcessTarget>) -> bool {
    let mut all = true;
    for (id, handle) in targets {
        all &= suspend_one(state, &id, handle).await;
    }
    all
}

async fn suspend_one(state: &EngineState, id: &str, handle: ProcessHandle) -> bool {
    let tree = state.ctx.tree.clone();
    let result = tokio::task::spawn_blocking(move || tree.suspend_tree(handle.pid)).await;

    match result {
        Ok(Ok(())) => {
            let applied = state
                .registry
                .update(id, |e| {
                    if e.status == Status::Running {
                        e.status = Status::Paused;
                        true
                    } else {
                        false
                    }
                })
                .unwrap_or(false);
            if applied {
                state.registry.mark_paused(id);
                info!(execution = %id, pid = handle.pid, "execution paused");
            } else {
                debug!(execution = %id, pid = handle.pid, "execution finished while pausing");
            }
            applied
        }
        Ok(Err(e)) if e.is_already_exited() => {
            debug!(execution = %id, pid = handle.pid, "process exited before pause");
            false
        }
        Ok(Err(e)) => {
            warn!(execution = %id, pid = handle.pid, error = %e, "pause failed");
            false
        }
        Err(e) => {
            error!(execution = %id, error = %e, "pause action panicked");
            false
        }
    }
}

enum ResumePlan {
    Logical,
    Resume(ProcessHandle),
}

fn plan_resume(state: &EngineState, id: &str) -> Option<ResumePlan> {
    let plan = state.registry.with_records(|r| {
        if r.execution(id)?.status != Status::Paused {
            return None;
        }
        match r.process(id) {
            Some(h) => Some(ResumePlan::Resume(h)),
            None => {
                r.execution_mut(id)?.status = Status::Pending;
                Some(ResumePlan::Logical)
            }
        }
    });
    if matches!(plan, Some(ResumePlan::Logical)) {
        state.registry.clear_paused(id);
        info!(execution = %id, "paused execution returned to pending");
    }
    plan
}

/// Logical half of a resume; mirrors [`begin_pause`].
pub fn begin_resume(state: &EngineState, id: &str) -> Option<Vec<ProcessTarget>> {
    if let Some(members) = state.registry.batch_members(id) {
        if state.registry.status(id).is_none_or(|s| s.is_terminal()) {
            return None;
        }
        let targets = members
            .into_iter()
            .filter_map(|m| match plan_resume(state, &m)? {
                ResumePlan::Resume(h) => Some((m, h)),
                ResumePlan::Logical => None,
            })
            .collect();
        state.registry.update_batch(id, |b| {
            if b.status == Status::Paused {
                b.status = Status::Running;
            }
        });
        info!(batch = %id, "batch resumed");
        return Some(targets);
    }

    match plan_resume(state, id)? {
        ResumePlan::Logical => Some(Vec::new()),
        ResumePlan::Resume(h) => Some(vec![(id.to_string(), h)]),
    }
}

/// Resume each target's process tree. Returns `true` if all succeeded.
pub async fn resume_all(state: &EngineState, targets: Vec<ProcessTarget>) -> bool {
    let mut all = true;
    for (id, handle) in targets {
        all &= resume_one(state, &id, handle).await;
    }
    all
}

async fn resume_one(state: &EngineState, id: &str, handle: ProcessHandle) -> bool {
    let tree = state.ctx.tree.clone();
    let result = tokio::task::spawn_blocking(move || tree.resume_tree(handle.pid)).await;

    match result {
        Ok(Ok(())) => {
            state.registry.update(id, |e| {
                if e.status == Status::Paused {
                    e.status = Status::Running;
                }
            });
            state.registry.clear_paused(id);
            info!(execution = %id, pid = handle.pid, "execution resumed");
            true
        }
        Ok(Err(e)) if e.is_already_exited() => {
            state.registry.clear_paused(id);
            debug!(execution = %id, pid = handle.pid, "process exited before resume");
            false
        }
        Ok(Err(e)) => {
            warn!(execution = %id, pid = handle.pid, error = %e, "resume failed");
            false
        }
        Err(e) => {
            error!(execution = %id, error = %e, "resume action panicked");
            false
        }
    }
}
