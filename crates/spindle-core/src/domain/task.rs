//! Task record: the durable row the whole lifecycle revolves around.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskId, TaskStatus, TaskType};
use crate::ports::clock::ago;

/// Metadata + payload for a task in the store.
///
/// Design:
/// - This is the "single source of truth" for task state.
/// - The delivery queue holds TaskId only.
/// - Status changes happen only through `TaskStore::update_if`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub submission_key: String,
    pub status: TaskStatus,

    /// Number of execution attempts accounted so far. Never decreases.
    pub attempts: u32,

    /// Maximum allowed attempts.
    pub max_attempts: u32,

    /// Earliest time a retried task may be claimed again.
    pub retry_at: Option<DateTime<Utc>>,

    /// Handler output, set only on SUCCESS.
    pub result: Option<serde_json::Value>,

    /// Last error message (if any).
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    /// Liveness heartbeat: stamped on every accepted write.
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Materialize a fresh PENDING record.
    pub fn new(task: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type,
            payload: task.payload,
            submission_key: task.submission_key,
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: task.max_attempts,
            retry_at: None,
            result: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `retry_at` is absent or already elapsed.
    pub fn is_retry_due(&self, now: DateTime<Utc>) -> bool {
        self.retry_at.is_none_or(|at| at <= now)
    }

    /// Heartbeat is older than `threshold`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.updated_at < ago(now, threshold)
    }
}

/// A task about to be inserted (id already assigned).
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub id: TaskId,
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub submission_key: String,
    pub max_attempts: u32,
}
