use serde::{Deserialize, Serialize};

use super::violation::SecurityViolation;

/// How an execution request terminated. `Timeout` and `Cancelled` are
/// operational outcomes, not security violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Sandboxed process exited with status 0.
    Completed,
    /// Sandboxed process exited with a non-zero status.
    Failed,
    /// Wall-clock ceiling hit; the process group was killed.
    Timeout,
    /// Cancellation token fired; the process group was killed.
    Cancelled,
    /// Validation rejected the request; execution never started.
    Rejected,
    /// The sandbox could not be set up or the process could not spawn.
    SetupFailure,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionOutcome::Completed => "completed",
            ExecutionOutcome::Failed => "failed",
            ExecutionOutcome::Timeout => "timeout",
            ExecutionOutcome::Cancelled => "cancelled",
            ExecutionOutcome::Rejected => "rejected",
            ExecutionOutcome::SetupFailure => "setup_failure",
        }
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a submitted request. Never retried internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub success: bool,
    pub outcome: ExecutionOutcome,
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub violations: Vec<SecurityViolation>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Result for a request rejected during validation.
    pub fn rejected(execution_id: &str, violations: Vec<SecurityViolation>) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            success: false,
            outcome: ExecutionOutcome::Rejected,
            exit_status: None,
            stdout: String::new(),
            stderr: String::new(),
            violations,
            duration_ms: 0,
        }
    }
}
