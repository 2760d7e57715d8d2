//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - adapter は差し替え可能、指定がなければ in-memory 実装

use std::sync::Arc;

use crate::app::claim::ClaimProtocol;
use crate::app::reaper_loop::ReaperLoop;
use crate::app::runtime::Runtime;
use crate::app::worker_loop::{WorkerGroup, WorkerLoop};
use crate::app::EngineContext;
use crate::config::EngineConfig;
use crate::domain::{Decider, DefaultDecider};
use crate::impls::{InMemoryDeliveryQueue, InMemoryTaskStore};
use crate::ports::{Clock, DeliveryQueue, IdGenerator, SystemClock, TaskStore, UlidGenerator};
use crate::typed::{Handler, RegistryError, Task, TypedRegistry};

/// EngineBuilder はエンジンを構築
///
/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new()
///     .register::<SendEmail, _>(SendEmailHandler::new(ledger, mailer))?
///     .expect_tasks(&["send_email"])
///     .config(EngineConfig::default().workers(8))
///     .build()?;
/// let workers = engine.start();
/// ```
///
/// # Fail-fast 設計
/// - expect_tasks() で期待される task_type を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」と config をチェック
/// - 不足があれば BuildError を返す
pub struct EngineBuilder {
    registry: TypedRegistry,
    expected_tasks: Option<Vec<String>>,
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn TaskStore>>,
    queue: Option<Arc<dyn DeliveryQueue>>,
    ids: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
}

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            registry: TypedRegistry::new(),
            expected_tasks: None,
            config: EngineConfig::default(),
            clock: None,
            store: None,
            queue: None,
            ids: None,
            decider: None,
        }
    }

    /// Handler を登録
    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// 期待される task_type のリストを設定
    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// 指定がなければ `DefaultDecider::new(config.retry)`
    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// # 検証
    /// - expect_tasks() で設定された task_type が全て登録されているか
    /// - config が実行可能な値か
    pub fn build(self) -> Result<Engine, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let registered_types = self.registry.registered_types();
            let missing_tasks: Vec<String> = expected_tasks
                .iter()
                .filter(|x| !registered_types.contains(x))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing_tasks));
            }
        }
        self.config.validate().map_err(BuildError::InvalidConfig)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new(Arc::clone(&clock))));
        let queue = self
            .queue
            .unwrap_or_else(|| Arc::new(InMemoryDeliveryQueue::new()));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(self.config.retry.clone())));

        Ok(Engine {
            ctx: Arc::new(EngineContext {
                store,
                queue,
                clock,
                ids,
                registry: Arc::new(self.registry),
                decider,
                config: self.config,
            }),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine は組み上がった依存一式への入口
#[derive(Clone)]
pub struct Engine {
    ctx: Arc<EngineContext>,
}

impl Engine {
    pub fn context(&self) -> Arc<EngineContext> {
        Arc::clone(&self.ctx)
    }

    pub fn runtime(&self) -> Runtime {
        Runtime::new(self.context())
    }

    pub fn claims(&self) -> ClaimProtocol {
        ClaimProtocol::new(self.context())
    }

    pub fn worker(&self, worker_id: usize) -> WorkerLoop {
        WorkerLoop::new(worker_id, self.context())
    }

    pub fn reaper(&self) -> ReaperLoop {
        ReaperLoop::new(self.context())
    }

    /// Spawn `config.workers` workers and the reaper on the current runtime.
    pub fn start(&self) -> WorkerGroup {
        WorkerGroup::spawn(self.context())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::handler::tests::{EchoHandler, EchoTask};

    #[test]
    fn test_build_success() {
        let engine = EngineBuilder::new()
            .register::<EchoTask, _>(EchoHandler)
            .unwrap()
            .expect_tasks(&[EchoTask::TYPE])
            .build();
        assert!(engine.is_ok());
    }

    #[test]
    fn test_build_missing_task_types() {
        let engine = EngineBuilder::new()
            .register::<EchoTask, _>(EchoHandler)
            .unwrap()
            .expect_tasks(&[EchoTask::TYPE, "send_email"])
            .build();
        assert!(matches!(
            engine,
            Err(BuildError::MissingTaskTypes(missing)) if missing == vec!["send_email".to_string()]
        ));
    }

    #[test]
    fn test_build_no_expect_tasks() {
        let engine = EngineBuilder::new()
            .register::<EchoTask, _>(EchoHandler)
            .unwrap()
            .build();
        assert!(engine.is_ok());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let engine = EngineBuilder::new()
            .config(EngineConfig::default().default_max_attempts(0))
            .build();
        assert!(matches!(engine, Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn test_decider_follows_config_retry_policy() {
        let retry = crate::domain::RetryPolicy::exponential(std::time::Duration::from_millis(10), 3.0);
        let engine = EngineBuilder::new()
            .config(EngineConfig::default().retry(retry.clone()))
            .build()
            .unwrap();
        let ctx = engine.context();
        assert_eq!(ctx.config.retry, retry);
        assert!(ctx.registry.is_empty());
    }
}
