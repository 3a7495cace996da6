use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Lifecycle status shared by executions and batches.
///
/// Executions move `Pending -> Running -> {Success, Failed, Error, Timeout,
/// Cancelled}`; `Paused` is reachable from `Pending` (logical) and `Running`
/// (the OS process is frozen). Batches only ever hold a status derived from
/// their members. `Unknown` is what `get_status` reports for ids that were
/// never registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    Running,
    Paused,
    Success,
    Failed,
    Error,
    Timeout,
    Cancelled,
    Unknown,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Success | Status::Failed | Status::Error | Status::Timeout | Status::Cancelled
        )
    }

    /// Terminal statuses that make a batch `Failed`.
    pub fn is_unsuccessful(self) -> bool {
        matches!(
            self,
            Status::Failed | Status::Error | Status::Timeout | Status::Cancelled
        )
    }

    /// Still waiting, running, or frozen.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Status::Pending | Status::Running | Status::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Running => "RUNNING",
            Status::Paused => "PAUSED",
            Status::Success => "SUCCESS",
            Status::Failed => "FAILED",
            Status::Error => "ERROR",
            Status::Timeout => "TIMEOUT",
            Status::Cancelled => "CANCELLED",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict derived from a script's free-text output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    Pass,
    Fail,
    Pending,
    Error,
    Timeout,
}

impl TestResult {
    pub fn as_str(self) -> &'static str {
        match self {
            TestResult::Pass => "pass",
            TestResult::Fail => "fail",
            TestResult::Pending => "pending",
            TestResult::Error => "error",
            TestResult::Timeout => "timeout",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pass" => Ok(TestResult::Pass),
            "fail" => Ok(TestResult::Fail),
            "pending" => Ok(TestResult::Pending),
            "error" => Ok(TestResult::Error),
            "timeout" => Ok(TestResult::Timeout),
            other => Err(format!(
                "invalid test result: {other} (expected pass, fail, pending, error or timeout)"
            )),
        }
    }
}
