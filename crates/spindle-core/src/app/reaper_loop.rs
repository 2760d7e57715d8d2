//! ReaperLoop - 通知の取りこぼしと落ちた worker の回収
//!
//! # フロー（1 sweep）
//! 1. zombie: IN_PROGRESS のまま `zombie_threshold` 以上 heartbeat が無いもの
//!    - 同じ条件付きで PENDING に戻し attempts+1、再通知
//!    - 予算切れなら DEAD
//! 2. pending: `pending_grace` 以上放置された PENDING / FAILED で retry_at 到来済みのもの
//!    - record は触らずに再通知するだけ
//!
//! どちらも store が正本なので、ここでやるのは通知の補償だけ。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::app::EngineContext;
use crate::domain::{Decision, TaskRecord, TaskStatus};
use crate::error::EngineError;
use crate::ports::clock::ago;
use crate::ports::{TaskFilter, TaskPatch, UpdateCondition};

/// 1 sweep の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    pub zombies_reset: usize,
    pub zombies_dead_lettered: usize,
    pub pending_renotified: usize,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone)]
pub struct ReaperLoop {
    ctx: Arc<EngineContext>,
}

impl ReaperLoop {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Sweep immediately, then every `reaper_interval`, until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.ctx.config.reaper_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.ctx.config.reaper_interval.as_millis() as u64,
            "reaper started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.is_empty() => debug!("reaper sweep: nothing to do"),
                        Ok(report) => info!(
                            zombies_reset = report.zombies_reset,
                            zombies_dead_lettered = report.zombies_dead_lettered,
                            pending_renotified = report.pending_renotified,
                            "reaper sweep done"
                        ),
                        // 次の tick がそのまま backoff になる
                        Err(e) => warn!(error = %e, "reaper sweep failed"),
                    }
                }
            }
        }

        info!("reaper stopped");
    }

    pub async fn sweep_once(&self) -> Result<ReapReport, EngineError> {
        let mut report = ReapReport::default();
        self.reap_zombies(&mut report).await?;
        self.renotify_pending(&mut report).await?;
        Ok(report)
    }

    async fn reap_zombies(&self, report: &mut ReapReport) -> Result<(), EngineError> {
        let cutoff = ago(self.ctx.clock.now(), self.ctx.config.zombie_threshold);
        let filter = TaskFilter::statuses(&[TaskStatus::InProgress]).updated_before(cutoff);
        let stale = self.ctx.store.list(&filter, self.ctx.config.reap_batch).await?;

        for record in stale {
            self.reap_zombie(record, cutoff, report).await?;
        }
        Ok(())
    }

    async fn reap_zombie(
        &self,
        record: TaskRecord,
        cutoff: chrono::DateTime<chrono::Utc>,
        report: &mut ReapReport,
    ) -> Result<(), EngineError> {
        let task_id = record.id;
        // scan と reset の間に worker が完了していたら 0 rows
        let condition = UpdateCondition::status_in(&[TaskStatus::InProgress])
            .updated_before(cutoff)
            .attempts_eq(record.attempts);

        match self.ctx.decider.on_worker_lost(&record) {
            Decision::Retry { reason, .. } => {
                let patch = TaskPatch::to(TaskStatus::Pending)
                    .incrementing_attempts()
                    .clearing_retry_at()
                    .with_error(reason);
                if self.ctx.store.update_if(task_id, &condition, patch).await? == 0 {
                    debug!(%task_id, "zombie finished or was reclaimed before reset");
                    return Ok(());
                }
                self.ctx.queue.push(task_id).await?;
                report.zombies_reset += 1;
                warn!(
                    %task_id,
                    task_type = %record.task_type,
                    attempts = record.attempts.saturating_add(1),
                    stale_since = %record.updated_at,
                    "zombie task reset to PENDING"
                );
            }
            Decision::MarkDead { reason } => {
                let patch = TaskPatch::to(TaskStatus::Dead)
                    .incrementing_attempts()
                    .with_error(reason.clone());
                if self.ctx.store.update_if(task_id, &condition, patch).await? == 0 {
                    return Ok(());
                }
                report.zombies_dead_lettered += 1;
                error!(
                    %task_id,
                    task_type = %record.task_type,
                    %reason,
                    "zombie task dead-lettered"
                );
            }
        }
        Ok(())
    }

    async fn renotify_pending(&self, report: &mut ReapReport) -> Result<(), EngineError> {
        let now = self.ctx.clock.now();
        let filter = TaskFilter::statuses(&TaskStatus::CLAIMABLE)
            .updated_before(ago(now, self.ctx.config.pending_grace))
            .retry_due_at(now);
        let orphans = self.ctx.store.list(&filter, self.ctx.config.reap_batch).await?;

        for record in orphans {
            self.ctx.queue.push(record.id).await?;
            report.pending_renotified += 1;
            debug!(task_id = %record.id, task_type = %record.task_type, "pending task re-notified");
        }
        Ok(())
    }
}
