//! WorkerLoop - タスク実行ループ
//!
//! # フロー
//! 1. DeliveryQueue::pop() で task_id 取得（shutdown と競合させる）
//! 2. ClaimProtocol::claim() で IN_PROGRESS を勝ち取る
//! 3. TypedRegistry::dispatch() → Handler 実行（panic は別 task で受け止める）
//! 4. 失敗なら Decider 実行 → Decision
//! 5. IN_PROGRESS を条件に完了を書き込む（SUCCESS / PENDING+retry_at / DEAD）
//!
//! handler のエラーはここで状態遷移に変換され、ループの外には出ない。
//! ループを止めるのは store / queue の障害だけで、その場合も
//! `infra_backoff` 待ってから再開する。
//! 完了の書き込みだけは handler の結果を捨てないよう、その場で
//! `completion_retries` 回まで書き直す（shutdown 中は打ち切る）。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::EngineContext;
use crate::app::claim::{ClaimOutcome, ClaimProtocol, SkipReason};
use crate::app::reaper_loop::ReaperLoop;
use crate::domain::{Decision, HandlerError, TaskId, TaskRecord, TaskStatus};
use crate::error::EngineError;
use crate::ports::clock::after;
use crate::ports::{QueueError, TaskPatch, UpdateCondition};

/// 1 通知を処理した結果
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Succeeded,
    RetryScheduled { retry_at: DateTime<Utc> },
    DeadLettered,
    Skipped(SkipReason),
    Deferred { retry_at: DateTime<Utc> },
    AlreadyClaimed,
    /// 完了の書き込みが 0 rows（実行中に reaper が回収した）
    CompletionLost,
}

/// WorkerLoop は 1 worker 分のループ
#[derive(Clone)]
pub struct WorkerLoop {
    worker_id: usize,
    ctx: Arc<EngineContext>,
    claims: ClaimProtocol,
    shutdown: Option<watch::Receiver<bool>>,
}

impl WorkerLoop {
    pub fn new(worker_id: usize, ctx: Arc<EngineContext>) -> Self {
        let claims = ClaimProtocol::new(Arc::clone(&ctx));
        Self {
            worker_id,
            ctx,
            claims,
            shutdown: None,
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Shutdown only stops popping: a handler already running is awaited.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.shutdown = Some(shutdown.clone());
        let worker = self.worker_id;
        info!(worker, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // pop は無期限に待つので shutdown と競合させる（pop は cancel-safe）
            let popped = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                popped = self.ctx.queue.pop() => popped,
            };

            let result = match popped {
                Ok(task_id) => self.process(task_id).await,
                Err(QueueError::Closed) => {
                    info!(worker, "delivery queue closed");
                    break;
                }
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(outcome) => debug!(worker, ?outcome, "notification handled"),
                Err(e) if e.is_infrastructure() => {
                    warn!(
                        worker,
                        error = %e,
                        backoff_ms = self.ctx.config.infra_backoff.as_millis() as u64,
                        "infrastructure error; pausing"
                    );
                    self.pause().await;
                }
                Err(e) => warn!(worker, error = %e, "notification dropped"),
            }
        }

        info!(worker, "worker stopped");
    }

    /// Claim, execute and complete one task.
    pub async fn process(&self, task_id: TaskId) -> Result<ProcessOutcome, EngineError> {
        let record = match self.claims.claim(task_id).await? {
            ClaimOutcome::Claimed(record) => record,
            ClaimOutcome::AlreadyClaimed => return Ok(ProcessOutcome::AlreadyClaimed),
            ClaimOutcome::Skipped(reason) => return Ok(ProcessOutcome::Skipped(reason)),
            ClaimOutcome::Deferred { retry_at } => {
                return Ok(ProcessOutcome::Deferred { retry_at });
            }
        };

        info!(
            worker = self.worker_id,
            %task_id,
            task_type = %record.task_type,
            attempts = record.attempts,
            "task started"
        );
        let started = Instant::now();
        let result = self.execute(&record).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        self.complete(record, result, elapsed_ms).await
    }

    async fn execute(&self, record: &TaskRecord) -> Result<serde_json::Value, HandlerError> {
        let handler = self.ctx.registry.dispatch(&record.task_type)?;
        let payload = record.payload.clone();
        let task_id = record.id;

        // handler の panic で worker を落とさない
        match tokio::spawn(async move { handler.handle_dyn(payload, task_id).await }).await {
            Ok(result) => result,
            Err(join_error) => Err(HandlerError::retryable(format!(
                "handler aborted: {join_error}"
            ))),
        }
    }

    async fn complete(
        &self,
        record: TaskRecord,
        result: Result<serde_json::Value, HandlerError>,
        elapsed_ms: u64,
    ) -> Result<ProcessOutcome, EngineError> {
        let worker = self.worker_id;
        let task_id = record.id;
        let attempts = record.attempts.saturating_add(1);
        // takeover されていれば attempts が進んでいる
        let owned = UpdateCondition::status_in(&[TaskStatus::InProgress]).attempts_eq(record.attempts);

        let handler_error = match result {
            Ok(value) => {
                let patch = TaskPatch::to(TaskStatus::Success)
                    .incrementing_attempts()
                    .with_result(value);
                if self.write_completion(task_id, &owned, patch).await? == 0 {
                    return Ok(self.completion_lost(&record));
                }
                info!(worker, %task_id, task_type = %record.task_type, attempts, elapsed_ms, "task succeeded");
                return Ok(ProcessOutcome::Succeeded);
            }
            Err(e) => e,
        };

        match self.ctx.decider.on_failure(&record, &handler_error) {
            Decision::Retry { delay, reason } => {
                let retry_at = after(self.ctx.clock.now(), delay);
                let patch = TaskPatch::to(TaskStatus::Pending)
                    .incrementing_attempts()
                    .with_retry_at(retry_at)
                    .with_error(handler_error.to_string());
                if self.write_completion(task_id, &owned, patch).await? == 0 {
                    return Ok(self.completion_lost(&record));
                }
                // retry_at までは通知しない
                if let Err(e) = self.ctx.queue.push_delayed(task_id, delay).await {
                    warn!(%task_id, error = %e, "retry stored but delayed notification failed");
                }
                warn!(
                    worker,
                    %task_id,
                    task_type = %record.task_type,
                    attempts,
                    %retry_at,
                    error = %handler_error,
                    %reason,
                    "task failed; retry scheduled"
                );
                Ok(ProcessOutcome::RetryScheduled { retry_at })
            }
            Decision::MarkDead { reason } => {
                let patch = TaskPatch::to(TaskStatus::Dead)
                    .incrementing_attempts()
                    .with_error(handler_error.to_string());
                if self.write_completion(task_id, &owned, patch).await? == 0 {
                    return Ok(self.completion_lost(&record));
                }
                error!(
                    worker,
                    %task_id,
                    task_type = %record.task_type,
                    attempts,
                    elapsed_ms,
                    error = %handler_error,
                    %reason,
                    "task dead-lettered"
                );
                Ok(ProcessOutcome::DeadLettered)
            }
        }
    }

    /// Conditional completion write, retried on store failure.
    ///
    /// Gives up after `completion_retries` extra tries, or once shutdown has
    /// been requested; the task then stays IN_PROGRESS for the reaper.
    async fn write_completion(
        &self,
        task_id: TaskId,
        owned: &UpdateCondition,
        patch: TaskPatch,
    ) -> Result<u64, EngineError> {
        let mut failures = 0u32;
        loop {
            let err = match self.ctx.store.update_if(task_id, owned, patch.clone()).await {
                Ok(rows) => return Ok(rows),
                Err(e) => e,
            };
            failures = failures.saturating_add(1);
            if failures > self.ctx.config.completion_retries || self.stopping() {
                error!(
                    worker = self.worker_id,
                    %task_id,
                    status = %patch.status,
                    failures,
                    error = %err,
                    "completion write abandoned; task left for the reaper"
                );
                return Err(err.into());
            }
            warn!(
                worker = self.worker_id,
                %task_id,
                status = %patch.status,
                failures,
                error = %err,
                "completion write failed; retrying"
            );
            self.pause().await;
        }
    }

    fn stopping(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// `infra_backoff`, cut short by shutdown.
    async fn pause(&self) {
        match self.shutdown.clone() {
            Some(mut rx) => {
                tokio::select! {
                    _ = tokio::time::sleep(self.ctx.config.infra_backoff) => {}
                    _ = rx.changed() => {}
                }
            }
            None => tokio::time::sleep(self.ctx.config.infra_backoff).await,
        }
    }

    fn completion_lost(&self, record: &TaskRecord) -> ProcessOutcome {
        warn!(
            worker = self.worker_id,
            task_id = %record.id,
            task_type = %record.task_type,
            "task no longer IN_PROGRESS; completion dropped"
        );
        ProcessOutcome::CompletionLost
    }
}

/// Worker group handle.
/// - `request_shutdown()` で全ループが pop をやめる
/// - `shutdown_and_join()` で実行中の handler の完了まで待つ
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `config.workers` workers plus the reaper.
    pub fn spawn(ctx: Arc<EngineContext>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let n = ctx.config.workers;
        info!(
            workers = n,
            task_types = %ctx.registry.registered_types().join(", "),
            "starting workers"
        );

        let mut joins = Vec::with_capacity(n + 1);
        for worker_id in 0..n {
            let worker = WorkerLoop::new(worker_id, Arc::clone(&ctx));
            joins.push(tokio::spawn(worker.run(shutdown_rx.clone())));
        }
        let reaper = ReaperLoop::new(Arc::clone(&ctx));
        joins.push(tokio::spawn(reaper.run(shutdown_rx)));

        Self { shutdown_tx, joins }
    }

    /// Request shutdown for all loops.
    /// In-flight handlers are not cancelled; loops just stop taking new work.
    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for every loop.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::runtime::SubmitRequest;
    use crate::app::test_support::{Harness, quick_backoff, submit_raw};
    use crate::config::EngineConfig;
    use crate::ports::{Clock, DeliveryQueue, TaskStore};
    use crate::typed::{Handler, Task};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::watch;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Boom {}

    impl Task for Boom {
        const TYPE: &'static str = "boom";
    }

    struct BoomHandler;

    #[async_trait]
    impl Handler<Boom> for BoomHandler {
        async fn handle(&self, _task: Boom, _task_id: TaskId) -> Result<serde_json::Value, HandlerError> {
            panic!("handler bug");
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Slow {
        millis: u64,
    }

    impl Task for Slow {
        const TYPE: &'static str = "slow";
    }

    struct SlowHandler;

    #[async_trait]
    impl Handler<Slow> for SlowHandler {
        async fn handle(&self, task: Slow, _task_id: TaskId) -> Result<serde_json::Value, HandlerError> {
            tokio::time::sleep(Duration::from_millis(task.millis)).await;
            Ok(json!({ "slept_ms": task.millis }))
        }
    }

    async fn wait_for_status(h: &Harness, id: TaskId, status: TaskStatus) -> TaskRecord {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let record = h.store.get(id).await.unwrap().unwrap();
                if record.status == status {
                    return record;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("status not reached in time")
    }

    #[tokio::test]
    async fn successful_task_records_result_and_attempt() {
        let h = Harness::new();
        let id = submit_raw(&h, "send_email", "k1", 3).await;

        assert_eq!(h.worker().process(id).await.unwrap(), ProcessOutcome::Succeeded);

        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.result.as_ref().unwrap()["sent"], true);
        assert_eq!(h.builtins.mailer.sent(), 1);

        // 重複通知は何もしない
        assert_eq!(
            h.worker().process(id).await.unwrap(),
            ProcessOutcome::Skipped(SkipReason::AlreadySucceeded)
        );
        assert_eq!(h.builtins.mailer.sent(), 1);
    }

    #[tokio::test]
    async fn retryable_failures_back_off_then_dead_letter() {
        let h = Harness::new();
        let id = submit_raw(&h, "test_failure", "k1", 3).await;
        let t0 = h.clock.now();

        let first = h.worker().process(id).await.unwrap();
        assert_eq!(
            first,
            ProcessOutcome::RetryScheduled { retry_at: t0 + chrono::Duration::seconds(2) }
        );
        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.last_error.as_deref(), Some("simulated transient failure"));

        // retry_at 前は claim されない
        assert!(matches!(
            h.worker().process(id).await.unwrap(),
            ProcessOutcome::Deferred { .. }
        ));
        assert_eq!(h.store.get(id).await.unwrap().unwrap().attempts, 1);

        h.clock.advance(Duration::from_secs(2));
        assert_eq!(
            h.worker().process(id).await.unwrap(),
            ProcessOutcome::RetryScheduled { retry_at: t0 + chrono::Duration::seconds(6) }
        );

        h.clock.advance(Duration::from_secs(4));
        assert_eq!(h.worker().process(id).await.unwrap(), ProcessOutcome::DeadLettered);

        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Dead);
        assert_eq!(record.attempts, 3);
        assert!(record.last_error.is_some());
    }

    #[tokio::test]
    async fn unknown_type_is_dead_on_first_attempt() {
        let h = Harness::new();
        let id = submit_raw(&h, "unknown_type", "k1", 3).await;

        assert_eq!(h.worker().process(id).await.unwrap(), ProcessOutcome::DeadLettered);
        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Dead);
        assert_eq!(record.attempts, 1);
        assert!(record.last_error.unwrap().contains("unknown task type"));
    }

    #[tokio::test]
    async fn malformed_payload_is_dead_on_first_attempt() {
        let h = Harness::new();
        let id = h
            .runtime()
            .submit(SubmitRequest::new("send_email", json!({ "subject": "no recipient" }), "k1"))
            .await
            .unwrap()
            .id;

        assert_eq!(h.worker().process(id).await.unwrap(), ProcessOutcome::DeadLettered);
        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.attempts, 1);
        assert!(record.last_error.unwrap().contains("to"));
        assert_eq!(h.builtins.mailer.sent(), 0);
    }

    #[tokio::test]
    async fn panicking_handler_is_a_retryable_failure() {
        let h = Harness::build(EngineConfig::default(), |b| {
            b.register::<Boom, _>(BoomHandler).unwrap()
        });
        let id = submit_raw(&h, "boom", "k1", 3).await;

        assert!(matches!(
            h.worker().process(id).await.unwrap(),
            ProcessOutcome::RetryScheduled { .. }
        ));
        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.last_error.unwrap().contains("handler aborted"));
    }

    #[tokio::test]
    async fn completion_after_takeover_is_dropped() {
        let h = Harness::new();
        let id = submit_raw(&h, "send_email", "k1", 3).await;
        let ClaimOutcome::Claimed(record) = h.claims().claim(id).await.unwrap() else {
            panic!("expected claim");
        };

        // 元の worker が止まっている間に別 worker が引き継ぐ
        h.clock.advance(h.ctx.config.zombie_threshold + Duration::from_secs(1));
        assert!(matches!(h.claims().claim(id).await.unwrap(), ClaimOutcome::Claimed(_)));

        let outcome = h
            .worker()
            .complete(record, Ok(json!({ "late": true })), 0)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::CompletionLost);

        let current = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(current.status, TaskStatus::InProgress);
        assert_eq!(current.result, None);
    }

    #[tokio::test]
    async fn group_drains_the_queue() {
        let h = Harness::with_config(EngineConfig::default().workers(3));
        let group = WorkerGroup::spawn(h.ctx.clone());

        let mut ids = Vec::new();
        for n in 0..10 {
            ids.push(submit_raw(&h, "send_email", &format!("k{n}"), 3).await);
        }
        for id in ids {
            let record = wait_for_status(&h, id, TaskStatus::Success).await;
            assert_eq!(record.attempts, 1);
        }
        assert_eq!(h.builtins.mailer.sent(), 10);

        group.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn shutdown_lets_the_running_handler_finish() {
        let h = Harness::build(EngineConfig::default().workers(1), |b| {
            b.register::<Slow, _>(SlowHandler).unwrap()
        });
        let group = WorkerGroup::spawn(h.ctx.clone());
        let id = h
            .runtime()
            .submit_task(&Slow { millis: 200 }, "k1", None)
            .await
            .unwrap()
            .id;

        wait_for_status(&h, id, TaskStatus::InProgress).await;
        group.shutdown_and_join().await;

        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.result, Some(json!({ "slept_ms": 200 })));
    }

    #[tokio::test]
    async fn idle_group_stops_promptly() {
        let h = Harness::new();
        let group = WorkerGroup::spawn(h.ctx.clone());
        tokio::time::timeout(Duration::from_secs(2), group.shutdown_and_join())
            .await
            .expect("workers did not stop");
        assert_eq!(h.queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_outage_at_completion_does_not_lose_the_result() {
        let h = Harness::with_config(quick_backoff(EngineConfig::default()));
        let id = submit_raw(&h, "send_email", "k1", 3).await;
        h.faulty_store.fail_releases(2);

        assert_eq!(h.worker().process(id).await.unwrap(), ProcessOutcome::Succeeded);

        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.result.unwrap()["to"], "a@b.com");
        assert_eq!(h.faulty_store.pending_faults(), 0);
        assert_eq!(h.builtins.mailer.sent(), 1);
    }

    #[tokio::test]
    async fn store_outage_while_scheduling_a_retry_is_retried() {
        let h = Harness::with_config(quick_backoff(EngineConfig::default()));
        let id = submit_raw(&h, "test_failure", "k1", 3).await;
        h.faulty_store.fail_releases(1);

        assert!(matches!(
            h.worker().process(id).await.unwrap(),
            ProcessOutcome::RetryScheduled { .. }
        ));
        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.attempts, 1);
        assert!(record.retry_at.is_some());
    }

    #[tokio::test]
    async fn persistent_completion_outage_leaves_the_task_to_the_reaper() {
        let h = Harness::with_config(quick_backoff(EngineConfig::default()).completion_retries(2));
        let id = submit_raw(&h, "send_email", "k1", 3).await;
        h.faulty_store.fail_releases(3);

        let err = h.worker().process(id).await.unwrap_err();
        assert!(err.is_infrastructure());
        assert_eq!(h.faulty_store.pending_faults(), 0);
        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::InProgress);
        assert_eq!(record.attempts, 0);

        assert_eq!(
            h.worker().process(id).await.unwrap(),
            ProcessOutcome::Skipped(SkipReason::OwnedByLiveWorker)
        );

        h.clock.advance(h.ctx.config.zombie_threshold + Duration::from_secs(1));
        assert_eq!(h.reaper().sweep_once().await.unwrap().zombies_reset, 1);
        assert_eq!(h.worker().process(id).await.unwrap(), ProcessOutcome::Succeeded);

        // 台帳に残った送信結果が再利用される
        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.attempts, 2);
        assert_eq!(h.builtins.mailer.sent(), 1);
    }

    #[tokio::test]
    async fn shutdown_cuts_the_completion_backoff_short() {
        let config = EngineConfig::default()
            .infra_backoff(Duration::from_secs(30))
            .completion_retries(10);
        let h = Harness::with_config(config);
        let id = submit_raw(&h, "send_email", "k1", 3).await;
        h.faulty_store.fail_releases(1);

        let (tx, rx) = watch::channel(false);
        let mut worker = h.worker();
        worker.shutdown = Some(rx);
        let processing = tokio::spawn(async move { worker.process(id).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        // 待ちは打ち切られ、最後の 1 回で書き込める
        let outcome = tokio::time::timeout(Duration::from_secs(2), processing)
            .await
            .expect("completion kept waiting after shutdown")
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Succeeded);
        assert_eq!(h.store.get(id).await.unwrap().unwrap().status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn worker_pauses_and_resumes_after_queue_outage() {
        let h = Harness::with_config(quick_backoff(EngineConfig::default().workers(1)));
        h.faulty_queue.fail_pops(3);
        let group = WorkerGroup::spawn(h.ctx.clone());

        let id = submit_raw(&h, "send_email", "k1", 3).await;
        let record = wait_for_status(&h, id, TaskStatus::Success).await;
        assert_eq!(record.attempts, 1);
        assert_eq!(h.faulty_queue.pending_faults(), 0);

        group.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn claim_outage_leaves_the_task_pending_for_the_sweep() {
        let h = Harness::with_config(quick_backoff(EngineConfig::default()));
        let id = submit_raw(&h, "send_email", "k1", 3).await;
        let notified = h.queue.pop().await.unwrap();
        h.faulty_store.fail_gets(1);

        let err = h.worker().process(notified).await.unwrap_err();
        assert!(err.is_infrastructure());
        let record = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert_eq!(h.queue.len().await.unwrap(), 0);

        h.clock.advance(h.ctx.config.pending_grace + Duration::from_secs(1));
        assert_eq!(h.reaper().sweep_once().await.unwrap().pending_renotified, 1);
        let renotified = h.queue.pop().await.unwrap();
        assert_eq!(renotified, id);
        assert_eq!(h.worker().process(renotified).await.unwrap(), ProcessOutcome::Succeeded);
    }

    #[tokio::test]
    async fn lost_retry_notification_is_recovered_by_the_sweep() {
        let h = Harness::new();
        let id = submit_raw(&h, "test_failure", "k1", 3).await;
        let _ = h.queue.pop().await.unwrap();
        h.faulty_queue.fail_delayed_pushes(1);

        // 記録は済んでいるので結果は RetryScheduled のまま
        assert!(matches!(
            h.worker().process(id).await.unwrap(),
            ProcessOutcome::RetryScheduled { .. }
        ));
        assert_eq!(h.queue.len().await.unwrap(), 0);

        h.clock.advance(h.ctx.config.pending_grace + Duration::from_secs(1));
        assert_eq!(h.reaper().sweep_once().await.unwrap().pending_renotified, 1);
        assert_eq!(h.queue.pop().await.unwrap(), id);
    }

    #[tokio::test]
    async fn worker_stops_when_the_queue_is_closed() {
        let h = Harness::new();
        let (_tx, rx) = watch::channel(false);
        let running = tokio::spawn(h.worker().run(rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        h.queue.close().await;

        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
