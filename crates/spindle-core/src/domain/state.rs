//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// TaskStatus はタスクの状態を表現
///
/// State transitions:
/// - PENDING -> IN_PROGRESS (claim)
/// - IN_PROGRESS -> SUCCESS
/// - IN_PROGRESS -> PENDING (retryable failure, or zombie reset)
/// - IN_PROGRESS -> DEAD (non-retryable failure, or attempts exhausted)
///
/// `FAILED` is never written by this engine. It is still recognized as a
/// claimable status so records left in it by other writers are picked up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Dead,
}

impl TaskStatus {
    /// Statuses a worker may claim from.
    pub const CLAIMABLE: [TaskStatus; 2] = [TaskStatus::Pending, TaskStatus::Failed];

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Dead)
    }

    pub fn is_claimable(self) -> bool {
        Self::CLAIMABLE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Dead => "DEAD",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
