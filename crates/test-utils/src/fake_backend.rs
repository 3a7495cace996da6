use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use seqrun::exec::{ExecutionBackend, Job, RunContext, RunOutcome};
use seqrun::registry::ProcessHandle;
use seqrun::types::Status;

const SLICE: Duration = Duration::from_millis(2);

/// What a fake script does when "run".
#[derive(Debug, Clone)]
pub struct FakeScript {
    pub lines: Vec<String>,
    /// Delay before each line.
    pub line_delay: Duration,
    /// Extra time spent after the last line before exiting.
    pub hold: Duration,
    pub outcome: RunOutcome,
    pub panics: bool,
}

impl Default for FakeScript {
    fn default() -> Self {
        Self {
            lines: vec!["PASS".to_string()],
            line_delay: Duration::ZERO,
            hold: Duration::ZERO,
            outcome: RunOutcome::Exited(Some(0)),
            panics: false,
        }
    }
}

impl FakeScript {
    pub fn printing<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn exit(mut self, code: i32) -> Self {
        self.outcome = RunOutcome::Exited(Some(code));
        self
    }

    pub fn outcome(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }

    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }
}

#[derive(Debug, Default)]
struct Inner {
    scripts: Mutex<HashMap<String, FakeScript>>,
    started: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    next_pid: AtomicU32,
}

/// An `ExecutionBackend` that never spawns processes.
///
/// - Scripts are looked up by file name; unknown names print `PASS` and
///   exit 0.
/// - Records start order and the peak number of concurrent runs.
/// - Registers a fake process handle, so pause/resume reach the tree
///   control; while the record is `PAUSED` no output is produced.
/// - Honours cancellation and the job deadline like the real controller.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Inner>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, name: &str, script: FakeScript) -> Self {
        self.inner
            .scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), script);
        self
    }

    /// File names of started scripts, in start order.
    pub fn started(&self) -> Vec<String> {
        self.inner.started.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    async fn run_job(&self, job: Job, ctx: &RunContext) -> RunOutcome {
        let name = job
            .script_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let script = self
            .inner
            .scripts
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_default();

        self.inner.started.lock().unwrap().push(name);
        let _active = ActiveGuard::enter(&self.inner);

        if let RunOutcome::SpawnFailed(msg) = &script.outcome {
            return RunOutcome::SpawnFailed(msg.clone());
        }
        if script.panics {
            panic!("fake backend asked to panic");
        }

        let pid = 10_000 + self.inner.next_pid.fetch_add(1, Ordering::SeqCst);
        ctx.registry
            .register_process_handle(&job.id, ProcessHandle { pid });

        let outcome = async {
            for line in &script.lines {
                if let Some(stop) = spend(&job, ctx, script.line_delay).await {
                    return stop;
                }
                ctx.registry.append_output(&job.id, line.clone());
            }
            if let Some(stop) = spend(&job, ctx, script.hold).await {
                return stop;
            }
            script.outcome.clone()
        }
        .await;

        ctx.registry.release_process_handle(&job.id);
        outcome
    }
}

impl ExecutionBackend for FakeBackend {
    fn run<'a>(
        &'a self,
        job: Job,
        ctx: &'a RunContext,
    ) -> Pin<Box<dyn Future<Output = RunOutcome> + Send + 'a>> {
        Box::pin(self.run_job(job, ctx))
    }
}

/// Let `budget` of unpaused time pass, watching for cancel and deadline.
async fn spend(job: &Job, ctx: &RunContext, budget: Duration) -> Option<RunOutcome> {
    let mut spent = Duration::ZERO;
    loop {
        if Instant::now() >= job.deadline() {
            return Some(RunOutcome::TimedOut);
        }
        match ctx.registry.status(&job.id) {
            Some(Status::Cancelled) => return Some(RunOutcome::Cancelled),
            Some(Status::Paused) => {
                tokio::time::sleep(SLICE).await;
                continue;
            }
            _ => {}
        }
        if spent >= budget {
            return None;
        }
        tokio::time::sleep(SLICE).await;
        spent += SLICE;
    }
}

struct ActiveGuard<'a>(&'a Inner);

impl<'a> ActiveGuard<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let now = inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak.fetch_max(now, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}
