// src/registry/mod.rs

//! In-memory store of execution/batch records and live process handles.
//!
//! Two independent locks:
//! - the primary lock guards records and the process-handle table;
//! - a smaller lock guards the set of currently paused ids, so pause checks
//!   in the dispatcher never queue behind heavier record operations.
//!
//! Critical sections are short and never block. Process-control actions
//! (suspend, resume, terminate, kill) must never run while the primary lock
//! is held: read and decide under the lock, release it, act on the OS
//! process, then re-acquire to write the result back.

pub mod ids;
pub mod record;

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::types::Status;

pub use ids::IdGenerator;
pub use record::{
    Batch, BatchCallback, BatchSnapshot, Execution, ExecutionCallback, ExecutionSnapshot, Params,
    ProcessHandle, RecordSnapshot,
};

/// Everything guarded by the primary lock.
#[derive(Debug, Default)]
pub struct Records {
    executions: HashMap<String, Execution>,
    batches: HashMap<String, Batch>,
    processes: HashMap<String, ProcessHandle>,
    /// Execution ids in creation order.
    order: Vec<String>,
}

impl Records {
    pub fn execution(&self, id: &str) -> Option<&Execution> {
        self.executions.get(id)
    }

    pub fn execution_mut(&mut self, id: &str) -> Option<&mut Execution> {
        self.executions.get_mut(id)
    }

    pub fn batch(&self, id: &str) -> Option<&Batch> {
        self.batches.get(id)
    }

    pub fn batch_mut(&mut self, id: &str) -> Option<&mut Batch> {
        self.batches.get_mut(id)
    }

    pub fn process(&self, id: &str) -> Option<ProcessHandle> {
        self.processes.get(id).copied()
    }

    /// Status of the batch an execution belongs to, if any.
    pub fn batch_status_of(&self, execution_id: &str) -> Option<Status> {
        let batch_id = self.executions.get(execution_id)?.batch_id()?;
        self.batches.get(batch_id).map(|b| b.status)
    }

    /// Member statuses in member order; unknown members count as `Unknown`.
    pub fn member_statuses(&self, batch_id: &str) -> Option<Vec<Status>> {
        let batch = self.batches.get(batch_id)?;
        Some(
            batch
                .execution_ids()
                .iter()
                .map(|id| {
                    self.executions
                        .get(id)
                        .map(|e| e.status)
                        .unwrap_or(Status::Unknown)
                })
                .collect(),
        )
    }
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    records: Mutex<Records>,
    paused: Mutex<HashSet<String>>,
    ids: IdGenerator,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Run `f` under the primary lock. `f` must not block or touch processes.
    pub fn with_records<R>(&self, f: impl FnOnce(&mut Records) -> R) -> R {
        let mut guard = lock(&self.records);
        f(&mut guard)
    }

    pub fn put_execution(&self, exec: Execution) {
        let mut records = lock(&self.records);
        debug!(execution = %exec.id, script = ?exec.script_path, "registered execution");
        records.order.push(exec.id.clone());
        records.executions.insert(exec.id.clone(), exec);
    }

    pub fn put_batch(&self, batch: Batch) {
        let mut records = lock(&self.records);
        debug!(batch = %batch.id, members = batch.execution_ids().len(), "registered batch");
        records.batches.insert(batch.id.clone(), batch);
    }

    pub fn get(&self, id: &str) -> Option<ExecutionSnapshot> {
        lock(&self.records).executions.get(id).map(Execution::snapshot)
    }

    pub fn get_batch(&self, id: &str) -> Option<BatchSnapshot> {
        lock(&self.records).batches.get(id).map(Batch::snapshot)
    }

    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Execution) -> R) -> Option<R> {
        lock(&self.records).executions.get_mut(id).map(f)
    }

    pub fn update_batch<R>(&self, id: &str, f: impl FnOnce(&mut Batch) -> R) -> Option<R> {
        lock(&self.records).batches.get_mut(id).map(f)
    }

    /// Snapshot of whatever record `id` names.
    pub fn snapshot(&self, id: &str) -> RecordSnapshot {
        let records = lock(&self.records);
        if let Some(e) = records.executions.get(id) {
            RecordSnapshot::Execution(e.snapshot())
        } else if let Some(b) = records.batches.get(id) {
            RecordSnapshot::Batch(b.snapshot())
        } else {
            RecordSnapshot::Unknown { id: id.to_string() }
        }
    }

    pub fn status(&self, id: &str) -> Option<Status> {
        let records = lock(&self.records);
        records
            .executions
            .get(id)
            .map(|e| e.status)
            .or_else(|| records.batches.get(id).map(|b| b.status))
    }

    pub fn batch_members(&self, id: &str) -> Option<Vec<String>> {
        lock(&self.records)
            .batches
            .get(id)
            .map(|b| b.execution_ids().to_vec())
    }

    /// All execution ids in creation order.
    pub fn execution_ids(&self) -> Vec<String> {
        lock(&self.records).order.clone()
    }

    pub fn list(&self) -> Vec<ExecutionSnapshot> {
        let records = lock(&self.records);
        records
            .order
            .iter()
            .filter_map(|id| records.executions.get(id))
            .map(Execution::snapshot)
            .collect()
    }

    /// Output lines of an execution, or of every member of a batch in member
    /// order.
    pub fn output(&self, id: &str) -> Vec<String> {
        let records = lock(&self.records);
        if let Some(e) = records.executions.get(id) {
            return e.output().to_vec();
        }
        match records.batches.get(id) {
            Some(b) => b
                .execution_ids()
                .iter()
                .filter_map(|m| records.executions.get(m))
                .flat_map(|e| e.output().iter().cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Append a line while the execution is live. Returns `false` once the
    /// record has reached a terminal status or is unknown.
    pub fn append_output(&self, id: &str, line: String) -> bool {
        let mut records = lock(&self.records);
        match records.executions.get_mut(id) {
            Some(e) if matches!(e.status, Status::Running | Status::Paused) => {
                e.push_line(line);
                true
            }
            _ => false,
        }
    }

    pub fn register_process_handle(&self, id: &str, handle: ProcessHandle) {
        debug!(execution = %id, pid = handle.pid, "process handle registered");
        lock(&self.records).processes.insert(id.to_string(), handle);
    }

    pub fn release_process_handle(&self, id: &str) -> Option<ProcessHandle> {
        let released = lock(&self.records).processes.remove(id);
        if let Some(h) = released {
            debug!(execution = %id, pid = h.pid, "process handle released");
        }
        released
    }

    pub fn process_handle(&self, id: &str) -> Option<ProcessHandle> {
        lock(&self.records).processes.get(id).copied()
    }

    pub fn mark_paused(&self, id: &str) {
        lock(&self.paused).insert(id.to_string());
    }

    pub fn clear_paused(&self, id: &str) -> bool {
        lock(&self.paused).remove(id)
    }

    pub fn is_paused(&self, id: &str) -> bool {
        lock(&self.paused).contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(reg: &TaskRegistry, batch: Option<&str>) -> String {
        let id = reg.ids().execution_id();
        reg.put_execution(Execution::new(
            id.clone(),
            "script.sh".into(),
            Params::new(),
            batch.map(str::to_string),
            None,
        ));
        id
    }

    #[test]
    fn unknown_id_snapshot_is_unknown() {
        let reg = TaskRegistry::new();
        assert_eq!(reg.snapshot("nope").status(), Status::Unknown);
        assert!(reg.output("nope").is_empty());
    }

    #[test]
    fn output_is_append_only_while_live() {
        let reg = TaskRegistry::new();
        let id = exec(&reg, None);

        assert!(!reg.append_output(&id, "too early".into()));
        reg.update(&id, |e| e.status = Status::Running);
        assert!(reg.append_output(&id, "one".into()));
        assert!(reg.append_output(&id, "two".into()));
        reg.update(&id, |e| e.status = Status::Success);
        assert!(!reg.append_output(&id, "too late".into()));

        assert_eq!(reg.output(&id), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn batch_output_concatenates_members_in_order() {
        let reg = TaskRegistry::new();
        let a = exec(&reg, Some("b1"));
        let b = exec(&reg, Some("b1"));
        reg.put_batch(Batch::new("b1".into(), vec![a.clone(), b.clone()], None));

        for (id, line) in [(&b, "from b"), (&a, "from a")] {
            reg.update(id, |e| e.status = Status::Running);
            reg.append_output(id, line.into());
        }

        assert_eq!(reg.output("b1"), vec!["from a".to_string(), "from b".to_string()]);
        let statuses = reg.with_records(|r| r.member_statuses("b1")).unwrap();
        assert_eq!(statuses, vec![Status::Running, Status::Running]);
    }

    #[test]
    fn process_handles_are_released_once() {
        let reg = TaskRegistry::new();
        let id = exec(&reg, None);
        reg.register_process_handle(&id, ProcessHandle { pid: 42 });
        assert_eq!(reg.process_handle(&id), Some(ProcessHandle { pid: 42 }));
        assert_eq!(reg.release_process_handle(&id), Some(ProcessHandle { pid: 42 }));
        assert_eq!(reg.release_process_handle(&id), None);
    }

    #[test]
    fn paused_set_is_independent_of_records() {
        let reg = TaskRegistry::new();
        reg.mark_paused("x");
        assert!(reg.is_paused("x"));
        assert!(reg.clear_paused("x"));
        assert!(!reg.clear_paused("x"));
    }
}
