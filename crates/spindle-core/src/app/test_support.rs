//! テスト用のワイヤリング（ManualClock + in-memory adapters + 組み込み handler）
//!
//! engine が見る store / queue は故障注入用のラッパー経由。
//! `Harness::store` / `Harness::queue` は中身の in-memory 実装を直接触る。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use chrono::{TimeZone, Utc};
use serde_json::json;

use crate::app::builder::EngineBuilder;
use crate::app::claim::ClaimProtocol;
use crate::app::reaper_loop::ReaperLoop;
use crate::app::runtime::{Runtime, SubmitRequest};
use crate::app::worker_loop::WorkerLoop;
use crate::app::EngineContext;
use crate::config::EngineConfig;
use crate::domain::{NewTask, TaskId, TaskRecord, TaskStatus};
use crate::handlers::Builtins;
use crate::impls::{InMemoryDeliveryQueue, InMemoryLedger, InMemoryTaskStore};
use crate::ports::{
    DeliveryQueue, Insertion, ManualClock, QueueError, StoreError, TaskFilter, TaskPatch,
    TaskStore, UpdateCondition,
};

pub(crate) struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryTaskStore>,
    pub queue: Arc<InMemoryDeliveryQueue>,
    pub faulty_store: Arc<FaultyStore>,
    pub faulty_queue: Arc<FaultyQueue>,
    pub builtins: Builtins,
    pub ctx: Arc<EngineContext>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(config, |builder| builder)
    }

    /// `extra` can register additional handlers.
    pub fn build(config: EngineConfig, extra: impl FnOnce(EngineBuilder) -> EngineBuilder) -> Self {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryTaskStore::new(clock.clone()));
        let queue = Arc::new(InMemoryDeliveryQueue::new());
        let faulty_store = Arc::new(FaultyStore::new(store.clone()));
        let faulty_queue = Arc::new(FaultyQueue::new(queue.clone()));
        let ledger = Arc::new(InMemoryLedger::new(clock.clone()));
        let builtins = Builtins::new(ledger, clock.clone());

        let builder = builtins
            .install(EngineBuilder::new())
            .unwrap()
            .config(config)
            .with_clock(clock.clone())
            .with_store(faulty_store.clone())
            .with_queue(faulty_queue.clone());
        let engine = extra(builder).build().unwrap();

        Self {
            clock,
            store,
            queue,
            faulty_store,
            faulty_queue,
            builtins,
            ctx: engine.context(),
        }
    }

    pub fn claims(&self) -> ClaimProtocol {
        ClaimProtocol::new(Arc::clone(&self.ctx))
    }

    pub fn worker(&self) -> WorkerLoop {
        WorkerLoop::new(0, Arc::clone(&self.ctx))
    }

    pub fn reaper(&self) -> ReaperLoop {
        ReaperLoop::new(Arc::clone(&self.ctx))
    }

    pub fn runtime(&self) -> Runtime {
        Runtime::new(Arc::clone(&self.ctx))
    }
}

/// Submit through the runtime (one notification is queued).
pub(crate) async fn submit_raw(
    h: &Harness,
    task_type: &str,
    submission_key: &str,
    max_attempts: u32,
) -> TaskId {
    h.runtime()
        .submit(
            SubmitRequest::new(task_type, json!({ "to": "a@b.com" }), submission_key)
                .max_attempts(max_attempts),
        )
        .await
        .unwrap()
        .id
}

/// Short pauses so infrastructure-error paths run in test time.
pub(crate) fn quick_backoff(config: EngineConfig) -> EngineConfig {
    config.infra_backoff(Duration::from_millis(5))
}

/// Consume one armed failure, if any.
fn trip(armed: &AtomicU32) -> bool {
    armed
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// TaskStore that passes through until told to fail the next `n` calls of a kind.
pub(crate) struct FaultyStore {
    inner: Arc<InMemoryTaskStore>,
    failing_gets: AtomicU32,
    failing_lists: AtomicU32,
    failing_releases: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryTaskStore>) -> Self {
        Self {
            inner,
            failing_gets: AtomicU32::new(0),
            failing_lists: AtomicU32::new(0),
            failing_releases: AtomicU32::new(0),
        }
    }

    pub fn fail_gets(&self, n: u32) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    pub fn fail_lists(&self, n: u32) {
        self.failing_lists.store(n, Ordering::SeqCst);
    }

    /// Writes that move a task out of IN_PROGRESS (completion, zombie reset).
    pub fn fail_releases(&self, n: u32) {
        self.failing_releases.store(n, Ordering::SeqCst);
    }

    /// Armed failures not yet consumed, over every kind.
    pub fn pending_faults(&self) -> u32 {
        self.failing_gets.load(Ordering::SeqCst)
            + self.failing_lists.load(Ordering::SeqCst)
            + self.failing_releases.load(Ordering::SeqCst)
    }

    fn outage() -> StoreError {
        StoreError::Unavailable("injected outage".to_string())
    }
}

#[async_trait]
impl TaskStore for FaultyStore {
    async fn insert_if_absent(&self, task: NewTask) -> Result<Insertion, StoreError> {
        self.inner.insert_if_absent(task).await
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        if trip(&self.failing_gets) {
            return Err(Self::outage());
        }
        self.inner.get(id).await
    }

    async fn update_if(
        &self,
        id: TaskId,
        condition: &UpdateCondition,
        patch: TaskPatch,
    ) -> Result<u64, StoreError> {
        let releases = condition.expected == [TaskStatus::InProgress]
            && patch.status != TaskStatus::InProgress;
        if releases && trip(&self.failing_releases) {
            return Err(Self::outage());
        }
        self.inner.update_if(id, condition, patch).await
    }

    async fn list(&self, filter: &TaskFilter, limit: usize) -> Result<Vec<TaskRecord>, StoreError> {
        if trip(&self.failing_lists) {
            return Err(Self::outage());
        }
        self.inner.list(filter, limit).await
    }
}

/// DeliveryQueue counterpart of `FaultyStore`.
pub(crate) struct FaultyQueue {
    inner: Arc<InMemoryDeliveryQueue>,
    failing_pops: AtomicU32,
    failing_delayed: AtomicU32,
}

impl FaultyQueue {
    pub fn new(inner: Arc<InMemoryDeliveryQueue>) -> Self {
        Self {
            inner,
            failing_pops: AtomicU32::new(0),
            failing_delayed: AtomicU32::new(0),
        }
    }

    pub fn fail_pops(&self, n: u32) {
        self.failing_pops.store(n, Ordering::SeqCst);
    }

    pub fn fail_delayed_pushes(&self, n: u32) {
        self.failing_delayed.store(n, Ordering::SeqCst);
    }

    pub fn pending_faults(&self) -> u32 {
        self.failing_pops.load(Ordering::SeqCst) + self.failing_delayed.load(Ordering::SeqCst)
    }

    fn outage() -> QueueError {
        QueueError::OperationFailed("injected outage".to_string())
    }
}

#[async_trait]
impl DeliveryQueue for FaultyQueue {
    async fn push(&self, task_id: TaskId) -> Result<(), QueueError> {
        self.inner.push(task_id).await
    }

    async fn push_delayed(&self, task_id: TaskId, delay: Duration) -> Result<(), QueueError> {
        if trip(&self.failing_delayed) {
            return Err(Self::outage());
        }
        self.inner.push_delayed(task_id, delay).await
    }

    async fn pop(&self) -> Result<TaskId, QueueError> {
        if trip(&self.failing_pops) {
            return Err(Self::outage());
        }
        self.inner.pop().await
    }

    async fn len(&self) -> Result<usize, QueueError> {
        self.inner.len().await
    }
}
