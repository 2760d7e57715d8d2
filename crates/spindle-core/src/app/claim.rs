//! Claim protocol - 実行前に勝ち取らなければならない原子的な状態遷移
//!
//! # フロー
//! 1. TaskStore::get() で最新の record を読む（通知は何も保証しない）
//! 2. short-circuit: SUCCESS / DEAD / 生きている worker が保持中 / retry_at が未来
//! 3. TaskStore::update_if() で PENDING|FAILED -> IN_PROGRESS（retry_at 経過が条件）
//! 4. 0 rows なら他の worker が勝った → 何もせず終了
//!
//! 排他制御はこの conditional update だけで行う（read-then-write はしない）。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::app::EngineContext;
use crate::domain::{Decision, TaskId, TaskRecord, TaskStatus};
use crate::error::EngineError;
use crate::ports::clock::{ago, until};
use crate::ports::{TaskPatch, UpdateCondition};

/// Why a notification was dropped without claiming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No record for this id.
    Missing,
    AlreadySucceeded,
    Dead,
    /// IN_PROGRESS with a fresh heartbeat.
    OwnedByLiveWorker,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This worker now owns the task (status is IN_PROGRESS).
    Claimed(TaskRecord),
    /// The conditional write affected 0 rows: someone else got there first.
    AlreadyClaimed,
    Skipped(SkipReason),
    /// Not eligible before `retry_at`; the notification was re-queued for then.
    Deferred { retry_at: DateTime<Utc> },
}

/// ClaimProtocol は 1 通知分の claim を行う
#[derive(Clone)]
pub struct ClaimProtocol {
    ctx: Arc<EngineContext>,
}

impl ClaimProtocol {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub async fn claim(&self, task_id: TaskId) -> Result<ClaimOutcome, EngineError> {
        let Some(record) = self.ctx.store.get(task_id).await? else {
            debug!(%task_id, "notification for unknown task dropped");
            return Ok(ClaimOutcome::Skipped(SkipReason::Missing));
        };
        let now = self.ctx.clock.now();
        let threshold = self.ctx.config.zombie_threshold;

        match record.status {
            TaskStatus::Success => Ok(ClaimOutcome::Skipped(SkipReason::AlreadySucceeded)),
            TaskStatus::Dead => Ok(ClaimOutcome::Skipped(SkipReason::Dead)),
            TaskStatus::InProgress if !record.is_stale(now, threshold) => {
                debug!(%task_id, "task owned by a live worker; skipping");
                Ok(ClaimOutcome::Skipped(SkipReason::OwnedByLiveWorker))
            }
            TaskStatus::InProgress => self.take_over(record, now).await,
            TaskStatus::Pending | TaskStatus::Failed => match record.retry_at {
                Some(retry_at) if retry_at > now => {
                    self.ctx
                        .queue
                        .push_delayed(task_id, until(now, retry_at))
                        .await?;
                    debug!(%task_id, %retry_at, "task not yet eligible; notification deferred");
                    Ok(ClaimOutcome::Deferred { retry_at })
                }
                _ => self.claim_claimable(task_id, now).await,
            },
        }
    }

    async fn claim_claimable(
        &self,
        task_id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, EngineError> {
        let condition = UpdateCondition::status_in(&TaskStatus::CLAIMABLE).retry_due_at(now);
        let rows = self
            .ctx
            .store
            .update_if(task_id, &condition, TaskPatch::to(TaskStatus::InProgress))
            .await?;
        self.after_claim_write(task_id, rows).await
    }

    /// Previous owner presumed dead: account its attempt, then claim (or dead-letter).
    async fn take_over(
        &self,
        record: TaskRecord,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, EngineError> {
        let task_id = record.id;
        let condition = UpdateCondition::status_in(&[TaskStatus::InProgress])
            .updated_before(ago(now, self.ctx.config.zombie_threshold))
            .attempts_eq(record.attempts);

        match self.ctx.decider.on_worker_lost(&record) {
            Decision::MarkDead { reason } => {
                let patch = TaskPatch::to(TaskStatus::Dead)
                    .incrementing_attempts()
                    .with_error(reason.clone());
                let rows = self.ctx.store.update_if(task_id, &condition, patch).await?;
                if rows == 0 {
                    return Ok(ClaimOutcome::AlreadyClaimed);
                }
                warn!(%task_id, task_type = %record.task_type, %reason, "stale task dead-lettered at claim");
                Ok(ClaimOutcome::Skipped(SkipReason::Dead))
            }
            Decision::Retry { .. } => {
                let patch = TaskPatch::to(TaskStatus::InProgress).incrementing_attempts();
                let rows = self.ctx.store.update_if(task_id, &condition, patch).await?;
                if rows == 1 {
                    info!(%task_id, task_type = %record.task_type, "took over stale task");
                }
                self.after_claim_write(task_id, rows).await
            }
        }
    }

    async fn after_claim_write(
        &self,
        task_id: TaskId,
        rows: u64,
    ) -> Result<ClaimOutcome, EngineError> {
        if rows == 0 {
            debug!(%task_id, "claim lost to another worker");
            return Ok(ClaimOutcome::AlreadyClaimed);
        }
        // RETURNING * 相当: 勝った後の record を読み直す
        match self.ctx.store.get(task_id).await? {
            Some(record) => Ok(ClaimOutcome::Claimed(record)),
            None => Ok(ClaimOutcome::Skipped(SkipReason::Missing)),
        }
    }
}
