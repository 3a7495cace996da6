// src/engine/core.rs

//! Pure decision rules for the dispatcher, finalization and batch monitor.
//!
//! Nothing here touches locks, channels, Tokio or processes; the async shell
//! reads state under the registry lock, asks these functions what to do and
//! writes the answer back. That keeps the race-sensitive rules testable on
//! their own.

use crate::exec::RunOutcome;
use crate::types::{Status, TestResult};

/// What the dispatcher does with a dequeued id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    /// Claim it and hand it to the backend.
    Run,
    /// Put it back at the tail of the queue and back off.
    Requeue,
    /// Forget it (cancelled, finished, or unknown).
    Drop,
}

/// Decide what to do with a dequeued execution.
///
/// `paused_flag` is the fast-path paused-set lookup; `batch` is the status of
/// the owning batch, if any.
pub fn dispatch_decision(
    execution: Option<Status>,
    batch: Option<Status>,
    paused_flag: bool,
) -> DispatchDecision {
    let Some(status) = execution else {
        return DispatchDecision::Drop;
    };
    if status.is_terminal() {
        return DispatchDecision::Drop;
    }
    if paused_flag || status == Status::Paused || batch == Some(Status::Paused) {
        return DispatchDecision::Requeue;
    }
    match status {
        Status::Pending => DispatchDecision::Run,
        _ => DispatchDecision::Drop,
    }
}

/// How the verdict of a finished run is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Run the result classifier over the captured output.
    Classify,
    Fixed(TestResult),
}

/// What finalization writes back for a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conclusion {
    /// The record is still live; overwrite it with this terminal state.
    Overwrite {
        status: Status,
        verdict: Verdict,
        error: Option<String>,
    },
    /// A concurrent actor (cancel, timeout) already concluded the record.
    /// Only fill in a verdict if none was set.
    Keep { default_verdict: TestResult },
}

/// Last-writer-wins protection: only a still-live record (`Running`, or
/// `Paused` when the watchdog fires on a frozen process) is overwritten.
pub fn conclude(current: Status, outcome: &RunOutcome) -> Conclusion {
    let live = matches!(current, Status::Running | Status::Paused);
    if !live {
        return Conclusion::Keep {
            default_verdict: match current {
                Status::Timeout => TestResult::Timeout,
                Status::Error => TestResult::Error,
                _ => TestResult::Pending,
            },
        };
    }

    match outcome {
        RunOutcome::Exited(Some(0)) => Conclusion::Overwrite {
            status: Status::Success,
            verdict: Verdict::Classify,
            error: None,
        },
        RunOutcome::Exited(code) => Conclusion::Overwrite {
            status: Status::Failed,
            verdict: Verdict::Classify,
            error: Some(match code {
                Some(code) => format!("script exited with code {code}"),
                None => "script terminated by signal".to_string(),
            }),
        },
        RunOutcome::SpawnFailed(msg) => Conclusion::Overwrite {
            status: Status::Error,
            verdict: Verdict::Fixed(TestResult::Error),
            error: Some(msg.clone()),
        },
        RunOutcome::TimedOut => Conclusion::Overwrite {
            status: Status::Timeout,
            verdict: Verdict::Fixed(TestResult::Timeout),
            error: Some("script exceeded its timeout".to_string()),
        },
        RunOutcome::Cancelled => Conclusion::Overwrite {
            status: Status::Cancelled,
            verdict: Verdict::Fixed(TestResult::Pending),
            error: None,
        },
    }
}

/// Aggregate view of a batch's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchProgress {
    InFlight { any_paused: bool },
    Complete(Status),
}

/// A batch is complete once no member is pending, running or paused; it
/// then fails if any member ended unsuccessfully.
pub fn evaluate_batch(members: &[Status]) -> BatchProgress {
    if members.iter().any(|s| s.is_in_flight()) {
        return BatchProgress::InFlight {
            any_paused: members.contains(&Status::Paused),
        };
    }
    if members.iter().any(|s| s.is_unsuccessful() || *s == Status::Unknown) {
        BatchProgress::Complete(Status::Failed)
    } else {
        BatchProgress::Complete(Status::Success)
    }
}

/// Batch status while members are still in flight: `Paused` while any member
/// is paused, `Running` otherwise.
pub fn in_flight_batch_status(any_paused: bool) -> Status {
    if any_paused { Status::Paused } else { Status::Running }
}
