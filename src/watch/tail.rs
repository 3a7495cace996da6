// src/watch/tail.rs

//! Output tail watcher: a best-effort secondary output channel.
//!
//! Some scripts write their real results to `.txt` / `.log` files instead of
//! stdout. For an execution with tailing enabled, the watcher polls a few
//! candidate directories around the script, picks up matching files that
//! were modified recently, and forwards every new non-blank line.
//!
//! Files present when the watcher starts are tailed from their current end,
//! so stale content from earlier runs is not replayed. Files that appear
//! later are read from the beginning. All I/O errors are swallowed: this
//! channel must never fail an execution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::errors::{EngineError, Result};
use crate::exec::decode::{decode_line, trim_line_ending};
use crate::fs::FileSystem;

/// Which files count and how fresh they must be.
#[derive(Debug, Clone)]
pub struct TailSettings {
    patterns: GlobSet,
    recent: Duration,
}

impl TailSettings {
    /// Compile case-insensitive file-name globs such as `*.log`.
    pub fn new(patterns: &[String], recent: Duration) -> Result<Self> {
        if patterns.is_empty() {
            return Err(EngineError::Config(
                "[tail].patterns must contain at least one pattern".into(),
            ));
        }
        let mut builder = GlobSetBuilder::new();
        for p in patterns {
            let glob = GlobBuilder::new(p)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|e| EngineError::Config(format!("invalid tail pattern '{p}': {e}")))?;
            builder.add(glob);
        }
        let patterns = builder
            .build()
            .map_err(|e| EngineError::Config(format!("building tail patterns: {e}")))?;
        Ok(Self { patterns, recent })
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.patterns.is_match(Path::new(name)))
    }
}

/// Script directory, its `output`/`logs` subdirectories, and the same three
/// one level up. Duplicates are removed, order is kept.
pub fn candidate_dirs(script: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut push_family = |base: &Path| {
        for dir in [base.to_path_buf(), base.join("output"), base.join("logs")] {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    };

    let own = script.parent().unwrap_or(Path::new("."));
    let own = if own.as_os_str().is_empty() { Path::new(".") } else { own };
    push_family(own);
    if let Some(up) = own.parent().filter(|p| !p.as_os_str().is_empty()) {
        push_family(up);
    }
    dirs
}

#[derive(Debug, Default)]
struct TrackedFile {
    offset: u64,
    partial: Vec<u8>,
}

/// Polling state for one execution.
#[derive(Debug)]
pub struct OutputTail {
    fs: Arc<dyn FileSystem>,
    dirs: Vec<PathBuf>,
    settings: TailSettings,
    files: HashMap<PathBuf, TrackedFile>,
}

impl OutputTail {
    /// Set up tailing for `script`, baselining files that already exist.
    pub fn new(fs: Arc<dyn FileSystem>, script: &Path, settings: TailSettings) -> Self {
        let mut tail = Self {
            dirs: candidate_dirs(script),
            fs,
            settings,
            files: HashMap::new(),
        };
        for path in tail.matching_files() {
            let offset = tail.fs.len(&path).unwrap_or(0);
            tail.files.insert(path, TrackedFile { offset, partial: Vec::new() });
        }
        tail
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn matching_files(&self) -> Vec<PathBuf> {
        self.dirs
            .iter()
            .filter(|d| self.fs.is_dir(d))
            .filter_map(|d| self.fs.read_dir(d).ok())
            .flatten()
            .filter(|p| self.settings.matches(p) && self.fs.is_file(p))
            .collect()
    }

    fn is_recent(&self, path: &Path, now: SystemTime) -> bool {
        match self.fs.modified(path) {
            Ok(mtime) => now
                .duration_since(mtime)
                .map(|age| age <= self.settings.recent)
                .unwrap_or(true),
            Err(_) => false,
        }
    }

    /// Discover new files and return the complete new lines since the last
    /// poll, in file-then-line order.
    pub fn poll(&mut self, now: SystemTime) -> Vec<String> {
        for path in self.matching_files() {
            if !self.files.contains_key(&path) && self.is_recent(&path, now) {
                debug!(file = ?path, "tailing new output file");
                self.files.insert(path, TrackedFile::default());
            }
        }

        let mut lines = Vec::new();
        let mut paths: Vec<PathBuf> = self.files.keys().cloned().collect();
        paths.sort();
        for path in paths {
            let Ok(len) = self.fs.len(&path) else {
                continue;
            };
            let Some(tracked) = self.files.get_mut(&path) else {
                continue;
            };
            if len < tracked.offset {
                // Truncated or replaced; start over.
                tracked.offset = 0;
                tracked.partial.clear();
            }
            if len == tracked.offset {
                continue;
            }
            let Ok(bytes) = self.fs.read_from(&path, tracked.offset) else {
                continue;
            };
            tracked.offset += bytes.len() as u64;
            tracked.partial.extend_from_slice(&bytes);

            let mut rest = std::mem::take(&mut tracked.partial);
            while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = rest.drain(..=pos).collect();
                push_non_blank(&mut lines, &line);
            }
            tracked.partial = rest;
        }
        if !lines.is_empty() {
            trace!(count = lines.len(), "tail watcher collected lines");
        }
        lines
    }

    /// Emit any unterminated trailing text.
    pub fn flush(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut paths: Vec<PathBuf> = self.files.keys().cloned().collect();
        paths.sort();
        for path in paths {
            if let Some(tracked) = self.files.get_mut(&path) {
                let partial = std::mem::take(&mut tracked.partial);
                push_non_blank(&mut lines, &partial);
            }
        }
        lines
    }
}

fn push_non_blank(lines: &mut Vec<String>, raw: &[u8]) {
    let line = decode_line(trim_line_ending(raw));
    if !line.trim().is_empty() {
        lines.push(line);
    }
}

/// Running tail watcher task.
#[derive(Debug)]
pub struct TailHandle {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TailHandle {
    /// Stop polling after one final pass and wait for the task to end.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.handle.await;
    }
}

/// Spawn the polling task; `on_line` receives each forwarded line.
pub fn spawn_tail_watcher<F>(mut tail: OutputTail, interval: Duration, on_line: F) -> TailHandle
where
    F: Fn(String) + Send + Sync + 'static,
{
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        debug!(dirs = ?tail.dirs(), "output tail watcher started");
        loop {
            let stopping = tokio::select! {
                _ = &mut stop_rx => true,
                _ = tokio::time::sleep(interval) => false,
            };

            for line in tail.poll(SystemTime::now()) {
                on_line(line);
            }

            if stopping {
                for line in tail.flush() {
                    on_line(line);
                }
                break;
            }
        }
        debug!("output tail watcher stopped");
    });

    TailHandle {
        stop: Some(stop_tx),
        handle,
    }
}
