// src/exec/controller.rs

//! Process controller: owns one script process end-to-end.
//!
//! Spawn, stream output into the registry, enforce the wall-clock timeout,
//! react to cancellation, and escalate termination. Suspend/resume is not
//! done here; the engine acts on the registered process handle through the
//! tree-control backend while this loop keeps polling.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at};
use tracing::{debug, error, info, warn};

use crate::exec::backend::{ExecutionBackend, Job, RunContext, RunOutcome};
use crate::exec::command::{build_command, LaunchSpec};
use crate::exec::decode::{decode_line, trim_line_ending};
use crate::exec::terminate::terminate;
use crate::fs::FileSystem;
use crate::registry::ProcessHandle;
use crate::types::Status;
use crate::watch::{spawn_tail_watcher, OutputTail, TailHandle, TailSettings};

/// Prefix for lines that came from the tail watcher rather than stdout.
pub const FILE_LINE_PREFIX: &str = "[FILE] ";

/// Tail watcher wiring, present only when file tailing is enabled.
#[derive(Debug, Clone)]
pub struct TailWiring {
    pub fs: Arc<dyn FileSystem>,
    pub settings: TailSettings,
}

/// Real backend that runs scripts as OS processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessController {
    launch: LaunchSpec,
    tail: Option<TailWiring>,
}

impl ProcessController {
    pub fn new(launch: LaunchSpec, tail: Option<TailWiring>) -> Self {
        Self { launch, tail }
    }

    async fn run_job(&self, job: Job, ctx: &RunContext) -> RunOutcome {
        info!(
            execution = %job.id,
            script = ?job.script_path,
            timeout_secs = job.timeout.as_secs(),
            "starting script process"
        );

        let spawned = build_command(&job.script_path, &job.params, &self.launch).spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!(execution = %job.id, script = ?job.script_path, error = %e, "failed to spawn script");
                return RunOutcome::SpawnFailed(format!(
                    "spawning {}: {e}",
                    job.script_path.display()
                ));
            }
        };

        if let Some(pid) = child.id() {
            ctx.registry
                .register_process_handle(&job.id, ProcessHandle { pid });
        }

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, line_tx.clone(), &job.id, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, line_tx.clone(), &job.id, "stderr"));
        }
        drop(line_tx);

        let tail = self.start_tail(&job, ctx);

        let outcome = stream_until_done(&job, ctx, &mut child, &mut line_rx, readers).await;

        if let Some(tail) = tail {
            tail.stop().await;
        }
        ctx.registry.release_process_handle(&job.id);

        debug!(execution = %job.id, ?outcome, "script process finished");
        outcome
    }

    fn start_tail(&self, job: &Job, ctx: &RunContext) -> Option<TailHandle> {
        let wiring = self.tail.as_ref()?;
        let tail = OutputTail::new(wiring.fs.clone(), &job.script_path, wiring.settings.clone());
        let registry = ctx.registry.clone();
        let id = job.id.clone();
        Some(spawn_tail_watcher(tail, ctx.timings.tail_interval, move |line| {
            registry.append_output(&id, format!("{FILE_LINE_PREFIX}{line}"));
        }))
    }
}

impl ExecutionBackend for ProcessController {
    fn run<'a>(
        &'a self,
        job: Job,
        ctx: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = RunOutcome> + Send + 'a>> {
        Box::pin(self.run_job(job, ctx))
    }
}

/// Forward decoded lines from one pipe until EOF.
fn spawn_line_reader<R>(
    stream: R,
    tx: UnboundedSender<String>,
    execution_id: &str,
    source: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let id = execution_id.to_string();
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(decode_line(trim_line_ending(&buf))).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(execution = %id, source, error = %e, "output pipe read failed");
                    break;
                }
            }
        }
        debug!(execution = %id, source, "output pipe closed");
    })
}

/// The streaming loop: watchdog, cancel check, line pump, idle exit probe.
async fn stream_until_done(
    job: &Job,
    ctx: &RunContext,
    child: &mut Child,
    lines: &mut UnboundedReceiver<String>,
    readers: Vec<JoinHandle<()>>,
) -> RunOutcome {
    let timings = &ctx.timings;
    let deadline = job.deadline();
    let mut idle: u32 = 0;
    let mut pipes_closed = false;

    loop {
        if Instant::now() >= deadline {
            warn!(
                execution = %job.id,
                timeout_secs = job.timeout.as_secs(),
                "script exceeded its timeout"
            );
            terminate(child, ctx.tree.as_ref(), timings.terminate_grace, &job.id).await;
            abort_readers(readers);
            while let Ok(line) = lines.try_recv() {
                ctx.registry.append_output(&job.id, line);
            }
            return RunOutcome::TimedOut;
        }

        if ctx.registry.status(&job.id) == Some(Status::Cancelled) {
            info!(execution = %job.id, "cancellation observed; stopping script");
            terminate(child, ctx.tree.as_ref(), timings.terminate_grace, &job.id).await;
            abort_readers(readers);
            return RunOutcome::Cancelled;
        }

        match lines.try_recv() {
            Ok(line) => {
                idle = 0;
                ctx.registry.append_output(&job.id, line);
                continue;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => pipes_closed = true,
        }

        idle += 1;
        if pipes_closed || idle >= timings.idle_polls_before_exit_check {
            idle = 0;
            match child.try_wait() {
                Ok(Some(status)) => {
                    drain(job, ctx, lines, readers).await;
                    info!(
                        execution = %job.id,
                        exit_code = ?status.code(),
                        success = status.success(),
                        "script process exited"
                    );
                    return RunOutcome::Exited(status.code());
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(execution = %job.id, error = %e, "could not poll process status");
                    drain(job, ctx, lines, readers).await;
                    return RunOutcome::Exited(None);
                }
            }
        }

        sleep(timings.idle_sleep).await;
    }
}

/// Collect whatever is still buffered in the pipes after exit. Bounded, since
/// an orphaned grandchild can keep a pipe open indefinitely.
async fn drain(
    job: &Job,
    ctx: &RunContext,
    lines: &mut UnboundedReceiver<String>,
    readers: Vec<JoinHandle<()>>,
) {
    let limit = tokio::time::Instant::now() + ctx.timings.drain_limit;
    for reader in readers {
        let abort = reader.abort_handle();
        if timeout_at(limit, reader).await.is_err() {
            debug!(execution = %job.id, "output pipe still open after exit; abandoning");
            abort.abort();
        }
    }
    while let Ok(line) = lines.try_recv() {
        ctx.registry.append_output(&job.id, line);
    }
}

fn abort_readers(readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        reader.abort();
    }
}
