//! TaskStore port - タスク状態の正本（source of truth）
//!
//! # 設計原則
//! - status の変更は `update_if`（compare-and-swap）経由のみ
//! - 前提条件を満たさない書き込みは no-op（0 rows）で、上書きはしない
//! - delivery queue が通知を失っても、すべての状態はここから再構築可能

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{NewTask, TaskId, TaskRecord, TaskStatus, TaskType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    #[error("task store operation failed: {0}")]
    OperationFailed(String),
}

/// Result of `insert_if_absent`.
#[derive(Debug, Clone, PartialEq)]
pub struct Insertion {
    pub record: TaskRecord,
    /// false when (type, submission_key) already existed and `record` is the existing row.
    pub created: bool,
}

/// Precondition of a conditional write.
///
/// All parts must hold for the write to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCondition {
    /// Current status must be one of these.
    pub expected: Vec<TaskStatus>,
    /// `updated_at` must be strictly older than this (heartbeat age check).
    pub updated_before: Option<DateTime<Utc>>,
    /// `retry_at` must be absent or `<=` this.
    pub retry_due_at: Option<DateTime<Utc>>,
    /// `attempts` must still equal this (detects a takeover in between).
    pub attempts: Option<u32>,
}

impl UpdateCondition {
    pub fn status_in(expected: &[TaskStatus]) -> Self {
        Self {
            expected: expected.to_vec(),
            updated_before: None,
            retry_due_at: None,
            attempts: None,
        }
    }

    pub fn updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.updated_before = Some(cutoff);
        self
    }

    pub fn retry_due_at(mut self, now: DateTime<Utc>) -> Self {
        self.retry_due_at = Some(now);
        self
    }

    pub fn attempts_eq(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn matches(&self, record: &TaskRecord) -> bool {
        self.expected.contains(&record.status)
            && self.updated_before.is_none_or(|cutoff| record.updated_at < cutoff)
            && self.retry_due_at.is_none_or(|now| record.is_retry_due(now))
            && self.attempts.is_none_or(|n| record.attempts == n)
    }
}

/// Fields to write when the condition holds.
///
/// `status` is always written. `attempts` can only be incremented.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPatch {
    pub status: TaskStatus,
    pub increment_attempts: bool,
    /// `Some(None)` clears `retry_at`, `None` leaves it untouched.
    pub retry_at: Option<Option<DateTime<Utc>>>,
    pub result: Option<serde_json::Value>,
    pub last_error: Option<String>,
}

impl TaskPatch {
    pub fn to(status: TaskStatus) -> Self {
        Self {
            status,
            increment_attempts: false,
            retry_at: None,
            result: None,
            last_error: None,
        }
    }

    pub fn incrementing_attempts(mut self) -> Self {
        self.increment_attempts = true;
        self
    }

    pub fn with_retry_at(mut self, at: DateTime<Utc>) -> Self {
        self.retry_at = Some(Some(at));
        self
    }

    pub fn clearing_retry_at(mut self) -> Self {
        self.retry_at = Some(None);
        self
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    /// Apply onto a record, stamping the heartbeat.
    pub fn apply(self, record: &mut TaskRecord, now: DateTime<Utc>) {
        record.status = self.status;
        if self.increment_attempts {
            record.attempts = record.attempts.saturating_add(1);
        }
        if let Some(retry_at) = self.retry_at {
            record.retry_at = retry_at;
        }
        if let Some(result) = self.result {
            record.result = Some(result);
        }
        if let Some(error) = self.last_error {
            record.last_error = Some(error);
        }
        record.updated_at = now;
    }
}

/// Range / listing query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// Empty means any status.
    pub statuses: Vec<TaskStatus>,
    pub task_type: Option<TaskType>,
    pub updated_before: Option<DateTime<Utc>>,
    pub created_since: Option<DateTime<Utc>>,
    pub retry_due_at: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn statuses(statuses: &[TaskStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn of_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.updated_before = Some(cutoff);
        self
    }

    pub fn created_since(mut self, since: DateTime<Utc>) -> Self {
        self.created_since = Some(since);
        self
    }

    pub fn retry_due_at(mut self, now: DateTime<Utc>) -> Self {
        self.retry_due_at = Some(now);
        self
    }

    pub fn matches(&self, record: &TaskRecord) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&record.status))
            && self.task_type.as_ref().is_none_or(|t| *t == record.task_type)
            && self.updated_before.is_none_or(|cutoff| record.updated_at < cutoff)
            && self.created_since.is_none_or(|since| record.created_at >= since)
            && self.retry_due_at.is_none_or(|now| record.is_retry_due(now))
    }
}

/// TaskStore はタスク状態の正本
///
/// すべての実装は `update_if` を単一のアトミックな conditional update として
/// 実装しなければならない（read-then-write は不可）。
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert unless (type, submission_key) already exists.
    async fn insert_if_absent(&self, task: NewTask) -> Result<Insertion, StoreError>;

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// Compare-and-swap on status. Returns rows affected (0 or 1).
    async fn update_if(
        &self,
        id: TaskId,
        condition: &UpdateCondition,
        patch: TaskPatch,
    ) -> Result<u64, StoreError>;

    /// Records matching `filter`, oldest `created_at` first, at most `limit`.
    async fn list(&self, filter: &TaskFilter, limit: usize)
    -> Result<Vec<TaskRecord>, StoreError>;
}
