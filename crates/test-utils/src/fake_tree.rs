use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use seqrun::errors::{EngineError, Result};
use seqrun::exec::ProcessTreeControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeCall {
    Suspend(u32),
    Resume(u32),
    Kill(u32),
}

#[derive(Debug, Default)]
struct Inner {
    calls: Mutex<Vec<TreeCall>>,
    fail: AtomicBool,
}

/// Tree control that records calls instead of signalling processes.
#[derive(Debug, Clone, Default)]
pub struct RecordingTree {
    inner: Arc<Inner>,
}

impl RecordingTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following suspend/resume fail.
    pub fn fail_from_now(&self) {
        self.inner.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TreeCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    fn record(&self, call: TreeCall, pid: u32) -> Result<()> {
        if self.inner.fail.load(Ordering::SeqCst) {
            return Err(EngineError::ProcessControl {
                pid,
                message: "refused by test".to_string(),
            });
        }
        self.inner.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl ProcessTreeControl for RecordingTree {
    fn descendants(&self, _pid: u32) -> Vec<u32> {
        Vec::new()
    }

    fn suspend_one(&self, pid: u32) -> Result<()> {
        self.record(TreeCall::Suspend(pid), pid)
    }

    fn resume_one(&self, pid: u32) -> Result<()> {
        self.record(TreeCall::Resume(pid), pid)
    }

    fn force_kill_pid(&self, pid: u32) -> Result<()> {
        self.inner.calls.lock().unwrap().push(TreeCall::Kill(pid));
        Ok(())
    }
}
