//! Runtime - submit / query の表面
//!
//! HTTP 層などの外側はここだけを呼ぶ。
//!
//! # submit のフロー
//! 1. 入力検証（type / payload / submission_key は必須）
//! 2. TaskStore::insert_if_absent() で (type, submission_key) を重複排除
//! 3. 新規なら DeliveryQueue::push() で 1 回だけ通知
//!
//! 2 と 3 はトランザクションではない。insert 後に push が失敗しても
//! PENDING のまま残り、reaper の pending sweep が拾い直す。

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::EngineContext;
use crate::app::status::TaskStats;
use crate::domain::{NewTask, TaskId, TaskRecord, TaskStatus, TaskType};
use crate::error::EngineError;
use crate::ports::TaskFilter;
use crate::ports::clock::ago;
use crate::typed::Task;

/// 未検証の submit 入力（HTTP body をそのまま受ける想定）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "type", default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub submission_key: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl SubmitRequest {
    pub fn new(
        task_type: impl Into<String>,
        payload: serde_json::Value,
        submission_key: impl Into<String>,
    ) -> Self {
        Self {
            task_type: Some(task_type.into()),
            payload: Some(payload),
            submission_key: Some(submission_key.into()),
            max_attempts: None,
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// submit の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: TaskId,
    pub status: TaskStatus,
    /// 既存の record を返した場合 true
    pub duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Submission {
    fn from_record(record: &TaskRecord, duplicate: bool) -> Self {
        Self {
            id: record.id,
            status: record.status,
            duplicate,
            result: record.result.clone(),
        }
    }
}

/// listTasks の絞り込み条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(rename = "type", default)]
    pub task_type: Option<String>,
}

impl TaskQuery {
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn of_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    fn to_filter(&self) -> TaskFilter {
        let mut filter = match self.status {
            Some(status) => TaskFilter::statuses(&[status]),
            None => TaskFilter::any(),
        };
        if let Some(task_type) = &self.task_type {
            filter = filter.of_type(TaskType::new(task_type.as_str()));
        }
        filter
    }
}

/// Runtime は submit / getTask / listTasks / getStats を提供
#[derive(Clone)]
pub struct Runtime {
    ctx: Arc<EngineContext>,
}

impl Runtime {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub async fn submit(&self, request: SubmitRequest) -> Result<Submission, EngineError> {
        let task_type = required(request.task_type, "type")?;
        let submission_key = required(request.submission_key, "submission_key")?;
        let payload = match request.payload {
            Some(payload) if !payload.is_null() => payload,
            _ => return Err(EngineError::Validation("payload is required".to_string())),
        };
        let max_attempts = request
            .max_attempts
            .unwrap_or(self.ctx.config.default_max_attempts);
        if max_attempts == 0 {
            return Err(EngineError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let insertion = self
            .ctx
            .store
            .insert_if_absent(NewTask {
                id: self.ctx.ids.generate_task_id(),
                task_type: TaskType::new(task_type),
                payload,
                submission_key,
                max_attempts,
            })
            .await?;
        let record = insertion.record;

        if !insertion.created {
            info!(
                task_id = %record.id,
                task_type = %record.task_type,
                status = %record.status,
                "duplicate submission; returning existing task"
            );
            return Ok(Submission::from_record(&record, true));
        }

        if let Err(e) = self.ctx.queue.push(record.id).await {
            // reaper が拾うので submit 自体は成功扱い
            warn!(task_id = %record.id, error = %e, "task stored but notification failed");
        }
        info!(
            task_id = %record.id,
            task_type = %record.task_type,
            max_attempts,
            "task submitted"
        );
        Ok(Submission::from_record(&record, false))
    }

    /// 型付き submit: payload は `T` を serialize したもの
    pub async fn submit_task<T: Task>(
        &self,
        task: &T,
        submission_key: impl Into<String>,
        max_attempts: Option<u32>,
    ) -> Result<Submission, EngineError> {
        let payload = serde_json::to_value(task)
            .map_err(|e| EngineError::Validation(format!("payload not serializable: {e}")))?;
        self.submit(SubmitRequest {
            task_type: Some(T::TYPE.to_string()),
            payload: Some(payload),
            submission_key: Some(submission_key.into()),
            max_attempts,
        })
        .await
    }

    pub async fn get_task(&self, id: TaskId) -> Result<TaskRecord, EngineError> {
        self.ctx
            .store
            .get(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// 古い順に最大 `limit` 件
    pub async fn list_tasks(
        &self,
        query: &TaskQuery,
        limit: usize,
    ) -> Result<Vec<TaskRecord>, EngineError> {
        Ok(self.ctx.store.list(&query.to_filter(), limit).await?)
    }

    /// 直近 `window` に作成されたタスクの集計
    pub async fn get_stats(&self, window: Duration) -> Result<TaskStats, EngineError> {
        let since = ago(self.ctx.clock.now(), window);
        let records = self
            .ctx
            .store
            .list(&TaskFilter::any().created_since(since), usize::MAX)
            .await?;
        Ok(TaskStats::from_records(window, &records))
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, EngineError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(EngineError::Validation(format!("{field} is required"))),
    }
}
