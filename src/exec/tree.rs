// src/exec/tree.rs

//! Process-tree control: suspend, resume and forced kill of a spawned
//! process together with all of its descendants.
//!
//! Per-descendant failures (already exited, permission denied, zombie) are
//! logged and skipped so siblings and the root are still handled. Only a
//! failure on the root process is reported to the caller.
//!
//! Ordering keeps the root from ever running while part of its tree is
//! frozen: suspend freezes the root first and then its descendants
//! (breadth-first), resume thaws descendants deepest-first and the root last.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::errors::{EngineError, Result};

/// Platform capability for acting on a whole process tree.
pub trait ProcessTreeControl: Send + Sync {
    /// All descendants of `pid`, breadth-first (children before grandchildren).
    fn descendants(&self, pid: u32) -> Vec<u32>;

    /// Suspend one process.
    fn suspend_one(&self, pid: u32) -> Result<()>;

    /// Resume one process.
    fn resume_one(&self, pid: u32) -> Result<()>;

    /// Last-resort forced kill by process id, tree included where supported.
    fn force_kill_pid(&self, pid: u32) -> Result<()>;

    /// Freeze `root` and then every descendant.
    fn suspend_tree(&self, root: u32) -> Result<()> {
        self.suspend_one(root)?;
        for pid in self.descendants(root) {
            if let Err(e) = self.suspend_one(pid) {
                log_child_failure("suspend", root, pid, &e);
            }
        }
        Ok(())
    }

    /// Thaw descendants deepest-first, then `root`.
    fn resume_tree(&self, root: u32) -> Result<()> {
        for pid in self.descendants(root).into_iter().rev() {
            if let Err(e) = self.resume_one(pid) {
                log_child_failure("resume", root, pid, &e);
            }
        }
        self.resume_one(root)
    }
}

fn log_child_failure(action: &str, root: u32, pid: u32, err: &EngineError) {
    if err.is_already_exited() {
        debug!(root, pid, action, "descendant already gone");
    } else {
        warn!(root, pid, action, error = %err, "failed to act on descendant; continuing");
    }
}

/// Breadth-first walk over a `(pid, ppid)` table.
pub fn walk_descendants(root: u32, table: &[(u32, u32)]) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for &(pid, ppid) in table {
        if pid != ppid {
            children.entry(ppid).or_default().push(pid);
        }
    }

    let mut out = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        if let Some(kids) = children.get(&pid) {
            for &kid in kids {
                if seen.insert(kid) {
                    out.push(kid);
                    queue.push_back(kid);
                }
            }
        }
    }
    out
}

#[cfg(unix)]
pub use posix::PosixTreeControl;

#[cfg(unix)]
mod posix {
    use std::path::Path;

    use super::*;

    /// Signal-based backend: SIGSTOP / SIGCONT / SIGKILL.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct PosixTreeControl;

    impl PosixTreeControl {
        fn signal(&self, pid: u32, sig: libc::c_int) -> Result<()> {
            let ret = unsafe { libc::kill(pid as libc::pid_t, sig) };
            if ret == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                Err(EngineError::ProcessAlreadyExited(pid))
            } else {
                Err(EngineError::ProcessControl {
                    pid,
                    message: err.to_string(),
                })
            }
        }

        fn process_table(&self) -> Vec<(u32, u32)> {
            if Path::new("/proc/self/stat").exists() {
                proc_table()
            } else {
                ps_table()
            }
        }
    }

    impl ProcessTreeControl for PosixTreeControl {
        fn descendants(&self, pid: u32) -> Vec<u32> {
            walk_descendants(pid, &self.process_table())
        }

        fn suspend_one(&self, pid: u32) -> Result<()> {
            self.signal(pid, libc::SIGSTOP)
        }

        fn resume_one(&self, pid: u32) -> Result<()> {
            self.signal(pid, libc::SIGCONT)
        }

        fn force_kill_pid(&self, pid: u32) -> Result<()> {
            let mut targets = self.descendants(pid);
            targets.push(pid);
            for target in targets {
                match self.signal(target, libc::SIGKILL) {
                    Ok(()) | Err(EngineError::ProcessAlreadyExited(_)) => {}
                    Err(e) if target != pid => log_child_failure("kill", pid, target, &e),
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        }
    }

    /// Parse `/proc/<pid>/stat`; the ppid is the second field after the
    /// parenthesised command name.
    fn proc_table() -> Vec<(u32, u32)> {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
                let stat = std::fs::read_to_string(entry.path().join("stat")).ok()?;
                parse_stat_ppid(&stat).map(|ppid| (pid, ppid))
            })
            .collect()
    }

    pub(super) fn parse_stat_ppid(stat: &str) -> Option<u32> {
        let after_comm = &stat[stat.rfind(')')? + 1..];
        after_comm.split_whitespace().nth(1)?.parse().ok()
    }

    fn ps_table() -> Vec<(u32, u32)> {
        let Ok(out) = std::process::Command::new("ps")
            .args(["-A", "-o", "pid=", "-o", "ppid="])
            .output()
        else {
            return Vec::new();
        };
        String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let pid = parts.next()?.parse().ok()?;
                let ppid = parts.next()?.parse().ok()?;
                Some((pid, ppid))
            })
            .collect()
    }
}

/// Backend for targets without POSIX job-control signals. Suspension is
/// reported as unsupported; forced kill goes through `taskkill`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackTreeControl;

impl ProcessTreeControl for FallbackTreeControl {
    fn descendants(&self, _pid: u32) -> Vec<u32> {
        Vec::new()
    }

    fn suspend_one(&self, pid: u32) -> Result<()> {
        Err(EngineError::ProcessControl {
            pid,
            message: "process suspension is not supported on this platform".into(),
        })
    }

    fn resume_one(&self, pid: u32) -> Result<()> {
        Err(EngineError::ProcessControl {
            pid,
            message: "process resumption is not supported on this platform".into(),
        })
    }

    fn force_kill_pid(&self, pid: u32) -> Result<()> {
        let status = std::process::Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .status()?;
        taskkill_outcome(pid, status.code())
    }
}

/// `taskkill` exits 0 on success and 128 when no such process exists; any
/// other code (access denied, bad arguments) is a real failure.
fn taskkill_outcome(pid: u32, code: Option<i32>) -> Result<()> {
    match code {
        Some(0) => Ok(()),
        Some(128) => Err(EngineError::ProcessAlreadyExited(pid)),
        Some(code) => Err(EngineError::ProcessControl {
            pid,
            message: format!("taskkill exited with code {code}"),
        }),
        None => Err(EngineError::ProcessControl {
            pid,
            message: "taskkill terminated by signal".into(),
        }),
    }
}

/// The tree-control backend for the current platform.
pub fn platform_tree_control() -> std::sync::Arc<dyn ProcessTreeControl> {
    #[cfg(unix)]
    {
        std::sync::Arc::new(PosixTreeControl)
    }
    #[cfg(not(unix))]
    {
        std::sync::Arc::new(FallbackTreeControl)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn walk_is_breadth_first_and_ignores_unrelated() {
        let table = [(10, 1), (11, 10), (12, 10), (13, 11), (20, 1), (21, 20)];
        assert_eq!(walk_descendants(10, &table), vec![11, 12, 13]);
        assert!(walk_descendants(13, &table).is_empty());
    }

    #[test]
    fn taskkill_failures_are_not_mistaken_for_exited_processes() {
        assert!(taskkill_outcome(42, Some(0)).is_ok());
        assert!(taskkill_outcome(42, Some(128)).unwrap_err().is_already_exited());

        let denied = taskkill_outcome(42, Some(1)).unwrap_err();
        assert!(!denied.is_already_exited());
        assert!(matches!(denied, EngineError::ProcessControl { pid: 42, .. }));
        assert!(matches!(taskkill_outcome(42, None), Err(EngineError::ProcessControl { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn stat_ppid_survives_parens_in_comm() {
        let stat = "1234 (weird) name)) S 77 1234 1234 0 -1";
        assert_eq!(posix::parse_stat_ppid(stat), Some(77));
    }

    /// Records calls; `dead` pids report already-exited.
    struct Recording {
        tree: Vec<(u32, u32)>,
        dead: Vec<u32>,
        calls: Mutex<Vec<(&'static str, u32)>>,
    }

    impl ProcessTreeControl for Recording {
        fn descendants(&self, pid: u32) -> Vec<u32> {
            walk_descendants(pid, &self.tree)
        }
        fn suspend_one(&self, pid: u32) -> Result<()> {
            self.calls.lock().unwrap().push(("stop", pid));
            if self.dead.contains(&pid) {
                return Err(EngineError::ProcessAlreadyExited(pid));
            }
            Ok(())
        }
        fn resume_one(&self, pid: u32) -> Result<()> {
            self.calls.lock().unwrap().push(("cont", pid));
            if self.dead.contains(&pid) {
                return Err(EngineError::ProcessAlreadyExited(pid));
            }
            Ok(())
        }
        fn force_kill_pid(&self, _pid: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn suspend_root_first_resume_root_last_and_tolerate_dead_children() {
        let ctl = Recording {
            tree: vec![(2, 1), (3, 2)],
            dead: vec![2],
            calls: Mutex::new(Vec::new()),
        };

        ctl.suspend_tree(1).unwrap();
        ctl.resume_tree(1).unwrap();

        let calls = ctl.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("stop", 1),
                ("stop", 2),
                ("stop", 3),
                ("cont", 3),
                ("cont", 2),
                ("cont", 1),
            ]
        );
    }

    #[test]
    fn dead_root_is_reported() {
        let ctl = Recording {
            tree: vec![],
            dead: vec![1],
            calls: Mutex::new(Vec::new()),
        };
        assert!(ctl.suspend_tree(1).unwrap_err().is_already_exited());
    }
}
