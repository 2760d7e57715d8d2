//! InMemoryDeliveryQueue - 開発用の配送キュー
//!
//! # 実装メモ
//! - ready: `VecDeque<TaskId>`（best-effort FIFO）
//! - delayed: `BinaryHeap`（最も早い due が先頭）。pop 時に due になったものを ready に昇格
//! - `Notify` で push を待機中の pop に通知
//! - ロックは pop/push の中で完結させる（ロックを跨いで await しない）
//! - `close()` 後の push は `QueueError::Closed`。pop は ready を出し切ってから Closed

use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::TaskId;
use crate::ports::{DeliveryQueue, QueueError};

/// Delayed notification entry.
///
/// We use reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct DelayedTask {
    due: Instant,
    task_id: TaskId,
}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

#[derive(Default)]
struct DeliveryState {
    ready: VecDeque<TaskId>,
    delayed: BinaryHeap<DelayedTask>,
    closed: bool,
}

impl DeliveryState {
    /// Move delayed entries whose time has come to the back of `ready`.
    fn promote_due(&mut self, now: Instant) {
        while self.delayed.peek().is_some_and(|entry| entry.due <= now) {
            if let Some(entry) = self.delayed.pop() {
                self.ready.push_back(entry.task_id);
            }
        }
    }
}

/// InMemoryDeliveryQueue は開発用の配送キュー
///
/// # 使用例
/// ```ignore
/// let queue = InMemoryDeliveryQueue::new();
/// queue.push(task_id).await?;
/// let task_id = queue.pop().await?;
/// ```
#[derive(Default)]
pub struct InMemoryDeliveryQueue {
    state: Mutex<DeliveryState>,
    notify: Notify,
}

impl InMemoryDeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop accepting notifications and wake every waiting `pop`.
    ///
    /// Delayed entries that are not yet due are dropped.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.delayed.clear();
        drop(state);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn push(&self, task_id: TaskId) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.ready.push_back(task_id);
        }
        // 待機中の pop に通知（ロックの外で）
        self.notify.notify_one();
        Ok(())
    }

    async fn push_delayed(&self, task_id: TaskId, delay: Duration) -> Result<(), QueueError> {
        if delay.is_zero() {
            return self.push(task_id).await;
        }
        let due = Instant::now()
            .checked_add(delay)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400 * 365));
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.delayed.push(DelayedTask { due, task_id });
        }
        // 眠っている pop に起床時刻を計算し直させる
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Result<TaskId, QueueError> {
        loop {
            // 状態を見る前に waiter として登録しておく（通知の取りこぼし防止）
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_wake = {
                let mut state = self.state.lock().await;
                state.promote_due(Instant::now());

                if let Some(task_id) = state.ready.pop_front() {
                    if !state.ready.is_empty() {
                        // 残りがあるなら他の waiter にもバトンを渡す
                        self.notify.notify_one();
                    }
                    return Ok(task_id);
                }
                if state.closed {
                    return Err(QueueError::Closed);
                }
                state.delayed.peek().map(|entry| entry.due)
            };

            match next_wake {
                Some(due) => {
                    tokio::select! {
                        _ = &mut notified => {},
                        _ = tokio::time::sleep_until(due) => {},
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let state = self.state.lock().await;
        Ok(state.ready.len() + state.delayed.len())
    }
}
