// src/engine/dispatcher.rs

//! The single dispatcher worker.
//!
//! Dequeues ids in FIFO order, claims runnable ones, hands each to the
//! execution backend and awaits it before taking the next. Paused items are
//! requeued at the tail with a short back-off so they never block items
//! behind them. Finalization (terminal status, verdict, completion callback)
//! happens here for every backend.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::engine::control::mark_cancelled;
use crate::engine::core::{conclude, dispatch_decision, Conclusion, DispatchDecision, Verdict};
use crate::engine::state::{invoke_callback, EngineState};
use crate::exec::{Job, RunOutcome};
use crate::registry::{ExecutionCallback, ExecutionSnapshot};
use crate::types::{Status, TestResult};

type Settled = Option<(ExecutionCallback, ExecutionSnapshot)>;

enum Claim {
    Run(Job),
    Requeue,
    /// Not runnable; carries the callback of a cancelled execution that has
    /// not been notified yet.
    Drop(Settled),
}

/// Main worker loop. Runs until the engine is shut down.
pub async fn run_dispatcher(state: Arc<EngineState>, mut queue: UnboundedReceiver<String>) {
    info!("dispatcher started");
    let timings = *state.timings();

    while state.is_running() {
        let id = match timeout(timings.dequeue_wait, queue.recv()).await {
            Ok(Some(id)) => id,
            Ok(None) => break,
            Err(_) => continue,
        };

        match claim(&state, &id) {
            Claim::Run(job) => run_claimed(&state, job).await,
            Claim::Requeue => {
                trace!(execution = %id, "paused; requeueing");
                if !state.enqueue(id) {
                    break;
                }
                sleep(timings.paused_backoff).await;
            }
            Claim::Drop(settled) => notify_dropped(&id, settled),
        }
    }

    // Settle what is still queued so cancelled executions are notified.
    queue.close();
    while let Ok(id) = queue.try_recv() {
        if let Claim::Drop(settled) = claim(&state, &id) {
            notify_dropped(&id, settled);
        }
    }
    info!("dispatcher stopped");
}

fn claim(state: &EngineState, id: &str) -> Claim {
    let paused_flag = state.registry.is_paused(id);
    let accepting = state.is_running();

    state.registry.with_records(|r| {
        let status = r.execution(id).map(|e| e.status);
        let batch = r.batch_status_of(id);
        let decision = dispatch_decision(status, batch, paused_flag);

        let Some(exec) = r.execution_mut(id) else {
            warn!(execution = %id, "dequeued unknown execution");
            return Claim::Drop(None);
        };

        match decision {
            DispatchDecision::Run if accepting => {
                exec.status = Status::Running;
                exec.start_time = Some(Utc::now());
                Claim::Run(Job {
                    id: exec.id.clone(),
                    script_path: exec.script_path.clone(),
                    params: exec.params.clone(),
                    timeout: state.timeout(),
                    started: Instant::now(),
                })
            }
            DispatchDecision::Run => {
                mark_cancelled(exec);
                Claim::Drop(take_settled(exec))
            }
            DispatchDecision::Requeue => Claim::Requeue,
            DispatchDecision::Drop if exec.status.is_terminal() => Claim::Drop(take_settled(exec)),
            DispatchDecision::Drop => {
                warn!(execution = %id, status = %exec.status, "dequeued execution in unexpected state");
                Claim::Drop(None)
            }
        }
    })
}

fn take_settled(exec: &mut crate::registry::Execution) -> Settled {
    exec.on_complete.take().map(|cb| (cb, exec.snapshot()))
}

fn notify_dropped(id: &str, settled: Settled) {
    debug!(execution = %id, "dropped from queue");
    if let Some((callback, snapshot)) = settled {
        invoke_callback("execution", id, callback.as_ref(), &snapshot);
    }
}

async fn run_claimed(state: &Arc<EngineState>, job: Job) {
    let id = job.id.clone();
    state.set_active(Some(id.clone()));
    debug!(execution = %id, script = ?job.script_path, "dispatching execution");

    // Run on its own task so a panicking backend cannot take the worker down.
    let backend = state.backend.clone();
    let ctx = state.ctx.clone();
    let handle = tokio::spawn(async move { backend.run(job, &ctx).await });
    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(execution = %id, error = %e, "execution backend failed");
            RunOutcome::SpawnFailed(format!("execution backend failed: {e}"))
        }
    };

    finalize(state, &id, outcome);
    state.set_active(None);
}

/// Write the terminal state for a finished run and fire its callback.
///
/// A record already concluded by a concurrent cancel or timeout keeps its
/// status; the callback still fires exactly once, taken from the record.
pub fn finalize(state: &EngineState, id: &str, outcome: RunOutcome) {
    let classified = match outcome {
        RunOutcome::Exited(_) => Some(state.classifier.classify(&state.registry.output(id))),
        _ => None,
    };

    let finished = state.registry.with_records(|r| {
        let exec = r.execution_mut(id)?;
        match conclude(exec.status, &outcome) {
            Conclusion::Overwrite {
                status,
                verdict,
                error,
            } => {
                exec.status = status;
                exec.test_result = Some(match verdict {
                    Verdict::Classify => classified.unwrap_or(TestResult::Pending),
                    Verdict::Fixed(result) => result,
                });
                if error.is_some() {
                    exec.error = error;
                }
                if status == Status::Success {
                    exec.progress = 100;
                }
            }
            Conclusion::Keep { default_verdict } => {
                if exec.test_result.is_none() {
                    exec.test_result = Some(default_verdict);
                }
            }
        }
        if exec.end_time.is_none() {
            exec.end_time = Some(Utc::now());
        }
        Some((exec.on_complete.take(), exec.snapshot()))
    });

    state.registry.clear_paused(id);
    state.registry.release_process_handle(id);

    let Some((callback, snapshot)) = finished else {
        warn!(execution = %id, "finished execution missing from registry");
        return;
    };

    info!(
        execution = %id,
        status = %snapshot.status,
        test_result = ?snapshot.test_result,
        lines = snapshot.output.len(),
        "execution finished"
    );

    if let Some(callback) = callback {
        invoke_callback("execution", id, callback.as_ref(), &snapshot);
    }
}
