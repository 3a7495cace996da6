// src/exec/terminate.rs

//! Termination escalation for a spawned script.
//!
//! graceful stop -> wait -> force kill -> wait -> platform kill by pid.
//! Every step treats "process already gone" as success.

use std::time::Duration;

use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::exec::tree::ProcessTreeControl;

/// How the process finally went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    AlreadyExited,
    Graceful,
    Killed,
    KilledByPid,
    /// Still alive after every step.
    Unconfirmed,
}

/// Ask the child's process group to stop. On Unix this is SIGTERM to the
/// group the child leads; elsewhere there is no graceful signal, so the
/// first step is the force kill.
fn request_graceful_stop(child: &mut Child) -> bool {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let ret = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGTERM) };
            if ret != 0 {
                // Not a group leader any more or already reaped; fall back
                // to the process itself.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
            // Frozen members only act on SIGTERM once continued.
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGCONT);
            }
            return true;
        }
        false
    }
    #[cfg(not(unix))]
    {
        child.start_kill().is_ok()
    }
}

async fn exited_within(child: &mut Child, grace: Duration) -> bool {
    matches!(timeout(grace, child.wait()).await, Ok(Ok(_)))
}

/// Run the escalation chain against `child`.
pub async fn terminate(
    child: &mut Child,
    tree: &dyn ProcessTreeControl,
    grace: Duration,
    execution_id: &str,
) -> Termination {
    if let Ok(Some(status)) = child.try_wait() {
        debug!(execution = %execution_id, ?status, "process already exited before termination");
        return Termination::AlreadyExited;
    }

    let pid = child.id();
    info!(execution = %execution_id, ?pid, "terminating process");

    if request_graceful_stop(child) && exited_within(child, grace).await {
        return Termination::Graceful;
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
            }
        }
    }
    match child.start_kill() {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
            return Termination::AlreadyExited;
        }
        Err(e) => debug!(execution = %execution_id, error = %e, "force kill request failed"),
    }
    if exited_within(child, grace).await {
        return Termination::Killed;
    }

    if let Some(pid) = pid {
        match tree.force_kill_pid(pid) {
            Ok(()) => {
                if exited_within(child, grace).await {
                    return Termination::KilledByPid;
                }
            }
            Err(e) if e.is_already_exited() => return Termination::KilledByPid,
            Err(e) => warn!(execution = %execution_id, pid, error = %e, "kill by pid failed"),
        }
    }

    warn!(execution = %execution_id, ?pid, "process did not confirm exit after escalation");
    Termination::Unconfirmed
}
