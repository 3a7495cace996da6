#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use seqrun::engine::Engine;
use seqrun::registry::{BatchCallback, BatchSnapshot, ExecutionCallback, ExecutionSnapshot};

pub use seqrun_test_utils::{
    fake_engine, fast_timings, init_tracing, with_timeout, EngineConfigBuilder, FakeBackend,
    FakeScript, RecordingTree, TreeCall,
};

/// Generous upper bound for anything the fake backend does.
pub const SETTLE: Duration = Duration::from_secs(5);

/// Write an `sh` script into `dir` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    path
}

/// Completion callback that collects every snapshot it receives.
pub fn collecting_callback() -> (ExecutionCallback, Arc<Mutex<Vec<ExecutionSnapshot>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cb: ExecutionCallback = Arc::new(move |snap: &ExecutionSnapshot| {
        sink.lock().unwrap().push(snap.clone());
    });
    (cb, seen)
}

pub fn collecting_batch_callback() -> (BatchCallback, Arc<Mutex<Vec<BatchSnapshot>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cb: BatchCallback = Arc::new(move |snap: &BatchSnapshot| {
        sink.lock().unwrap().push(snap.clone());
    });
    (cb, seen)
}

/// Poll until `cond` holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let started = std::time::Instant::now();
    while started.elapsed() < limit {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Wait until every execution known to `engine` has settled.
pub async fn settle(engine: &Engine) {
    assert!(engine.wait_idle(SETTLE).await, "engine did not go idle");
}
