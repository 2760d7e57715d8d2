//! TypedRegistry - task_type から Handler を引く表
//!
//! 起動時に組み立てて、以降は `Arc` 越しに読み取り専用で共有する。
//! 未登録の task_type は worker 側で non-retryable として DEAD になる。

use crate::domain::{HandlerError, TaskType};
use crate::typed::handler::TypedHandler;

use super::handler::{DynHandler, Handler};
use super::task::Task;
use std::collections::HashMap;
use std::sync::Arc;

/// TypedRegistry は型付き Handler を登録・管理
///
/// # 使用例
/// ```ignore
/// let mut registry = TypedRegistry::new();
/// registry.register::<SendEmail, _>(SendEmailHandler::new(ledger))?;
///
/// // task_type で DynHandler を取得（未登録なら non-retryable エラー）
/// let handler = registry.dispatch(&TaskType::new("send_email"))?;
/// ```
#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

/// RegistryError は TypedRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for task type '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        let task_type = T::TYPE.to_string();
        if self.handlers.contains_key(&task_type) {
            return Err(RegistryError::AlreadyRegistered(task_type));
        }
        let typed_handler = TypedHandler::new(handler);
        self.handlers.insert(task_type, Arc::new(typed_handler));
        Ok(())
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// Resolve a handler; an unregistered type is a permanent failure.
    pub fn dispatch(&self, task_type: &TaskType) -> Result<Arc<dyn DynHandler>, HandlerError> {
        match self.get(task_type.as_str()) {
            Some(handler) => Ok(handler),
            None => Err(HandlerError::unknown_task_type(
                task_type,
                &self.registered_types(),
            )),
        }
    }

    /// Registered task types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
