//! DeliveryQueue port - 配送キュー
//!
//! DeliveryQueue は task_id のみを流します（状態や payload は含まない）。
//! 通知は失われても、重複しても、順序が入れ替わってもよい。正本は TaskStore。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TaskId;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("delivery queue closed")]
    Closed,

    #[error("delivery queue operation failed: {0}")]
    OperationFailed(String),
}

/// DeliveryQueue は task_id を配送するためのキュー
///
/// # 設計原則
/// - task_id のみを保持（状態・payload は TaskStore に保存）
/// - multi-producer / multi-consumer で安全
/// - `pop` は無期限に blocking し、cancel-safe（返していない要素は失わない）
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn push(&self, task_id: TaskId) -> Result<(), QueueError>;

    /// Deliver `task_id` no earlier than `delay` from now.
    async fn push_delayed(&self, task_id: TaskId, delay: Duration) -> Result<(), QueueError>;

    /// Wait until a notification is available.
    async fn pop(&self) -> Result<TaskId, QueueError>;

    /// Ready + delayed notifications currently held.
    async fn len(&self) -> Result<usize, QueueError>;
}
