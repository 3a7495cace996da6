// src/registry/record.rs

//! Execution and batch records plus their caller-facing snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Status, TestResult};

/// Completion hook for a single execution. Invoked at most once.
pub type ExecutionCallback = Arc<dyn Fn(&ExecutionSnapshot) + Send + Sync>;

/// Completion hook for a batch. Invoked exactly once when the batch ends.
pub type BatchCallback = Arc<dyn Fn(&BatchSnapshot) + Send + Sync>;

/// Script parameters, passed to the process in key order.
pub type Params = BTreeMap<String, String>;

/// One requested run of one script.
pub struct Execution {
    pub id: String,
    pub script_path: PathBuf,
    pub params: Params,
    batch_id: Option<String>,
    pub status: Status,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    output: Vec<String>,
    pub error: Option<String>,
    pub progress: u8,
    pub test_result: Option<TestResult>,
    pub on_complete: Option<ExecutionCallback>,
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.id)
            .field("script_path", &self.script_path)
            .field("batch_id", &self.batch_id)
            .field("status", &self.status)
            .field("lines", &self.output.len())
            .finish_non_exhaustive()
    }
}

impl Execution {
    pub fn new(
        id: String,
        script_path: PathBuf,
        params: Params,
        batch_id: Option<String>,
        on_complete: Option<ExecutionCallback>,
    ) -> Self {
        Self {
            id,
            script_path,
            params,
            batch_id,
            status: Status::Pending,
            start_time: None,
            end_time: None,
            output: Vec::new(),
            error: None,
            progress: 0,
            test_result: None,
            on_complete,
        }
    }

    pub fn batch_id(&self) -> Option<&str> {
        self.batch_id.as_deref()
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Append one line and bump the cosmetic progress estimate.
    pub fn push_line(&mut self, line: String) {
        self.output.push(line);
        self.progress = progress_for(self.output.len());
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            id: self.id.clone(),
            script_path: self.script_path.clone(),
            params: self.params.clone(),
            batch_id: self.batch_id.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            output: self.output.clone(),
            error: self.error.clone(),
            progress: self.progress,
            test_result: self.test_result,
        }
    }
}

/// `min(90, lines * 2)`; only completion moves it to 100.
pub fn progress_for(lines: usize) -> u8 {
    lines.saturating_mul(2).min(90) as u8
}

/// A fixed, ordered group of executions created together.
pub struct Batch {
    pub id: String,
    execution_ids: Vec<String>,
    pub status: Status,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub on_complete: Option<BatchCallback>,
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("members", &self.execution_ids.len())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Batch {
    pub fn new(id: String, execution_ids: Vec<String>, on_complete: Option<BatchCallback>) -> Self {
        Self {
            id,
            execution_ids,
            status: Status::Running,
            start_time: Some(Utc::now()),
            end_time: None,
            on_complete,
        }
    }

    pub fn execution_ids(&self) -> &[String] {
        &self.execution_ids
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            id: self.id.clone(),
            execution_ids: self.execution_ids.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// Copy of an execution record, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSnapshot {
    pub id: String,
    pub script_path: PathBuf,
    pub params: Params,
    pub batch_id: Option<String>,
    pub status: Status,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub output: Vec<String>,
    pub error: Option<String>,
    pub progress: u8,
    pub test_result: Option<TestResult>,
}

/// Copy of a batch record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSnapshot {
    pub id: String,
    pub execution_ids: Vec<String>,
    pub status: Status,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// What `get_status` returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordSnapshot {
    Execution(ExecutionSnapshot),
    Batch(BatchSnapshot),
    Unknown { id: String },
}

impl RecordSnapshot {
    pub fn status(&self) -> Status {
        match self {
            RecordSnapshot::Execution(e) => e.status,
            RecordSnapshot::Batch(b) => b.status,
            RecordSnapshot::Unknown { .. } => Status::Unknown,
        }
    }

    pub fn as_execution(&self) -> Option<&ExecutionSnapshot> {
        match self {
            RecordSnapshot::Execution(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_batch(&self) -> Option<&BatchSnapshot> {
        match self {
            RecordSnapshot::Batch(b) => Some(b),
            _ => None,
        }
    }
}

/// Live OS process attached to a running execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_capped_below_completion() {
        assert_eq!(progress_for(0), 0);
        assert_eq!(progress_for(10), 20);
        assert_eq!(progress_for(45), 90);
        assert_eq!(progress_for(10_000), 90);
    }

    #[test]
    fn snapshot_carries_output_but_not_callback() {
        let cb: ExecutionCallback = Arc::new(|_| {});
        let mut exec = Execution::new("e1".into(), "a.sh".into(), Params::new(), None, Some(cb));
        exec.push_line("hello".into());

        let snap = exec.snapshot();
        assert_eq!(snap.output, vec!["hello".to_string()]);
        assert_eq!(snap.progress, 2);
        assert_eq!(snap.status, Status::Pending);
    }
}
