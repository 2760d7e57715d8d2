//! Handler trait - Task を実行する Handler の定義
//!
//! worker は payload (JSON) と task_id しか知らないので、
//! `TypedHandler<T, H>` が decode してから `Handler<T>` に渡す。
//! decode できない payload は non-retryable。

use super::task::Task;
use crate::domain::{HandlerError, TaskId};
use async_trait::async_trait;
use std::marker::PhantomData;

/// Handler は Task を実行して result を返す
///
/// 同じ task_id で何度呼ばれてもよいように書くこと（at-least-once 実行）。
/// 外部副作用がある場合は `app::idempotent::run_once` で台帳を経由する。
///
/// # 使用例
/// ```ignore
/// struct SendEmailHandler;
///
/// #[async_trait]
/// impl Handler<SendEmail> for SendEmailHandler {
///     async fn handle(&self, task: SendEmail, task_id: TaskId) -> Result<Value, HandlerError> {
///         Ok(json!({ "sent": true, "to": task.to }))
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T, task_id: TaskId) -> Result<serde_json::Value, HandlerError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// TypedHandler<T> を DynHandler に変換することで、
/// HashMap<String, Arc<dyn DynHandler>> に格納可能にします。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        task_id: TaskId,
    ) -> Result<serde_json::Value, HandlerError>;
    fn task_type(&self) -> &str;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        task_id: TaskId,
    ) -> Result<serde_json::Value, HandlerError> {
        // decode できない payload はリトライしても直らない
        let task: T = serde_json::from_value(payload)
            .map_err(|e| HandlerError::non_retryable(format!("malformed payload: {e}")))?;
        self.handler.handle(task, task_id).await
    }

    fn task_type(&self) -> &str {
        T::TYPE
    }
}
