//! EngineContext - worker / reaper / runtime が共有する依存関係一式

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::domain::Decider;
use crate::ports::{Clock, DeliveryQueue, IdGenerator, TaskStore};
use crate::typed::TypedRegistry;

/// 起動時に一度だけ組み立てられ、以降は読み取り専用で共有される
pub struct EngineContext {
    pub store: Arc<dyn TaskStore>,
    pub queue: Arc<dyn DeliveryQueue>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub registry: Arc<TypedRegistry>,
    pub decider: Arc<dyn Decider>,
    pub config: EngineConfig,
}
