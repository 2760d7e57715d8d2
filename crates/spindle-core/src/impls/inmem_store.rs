//! InMemoryTaskStore - 開発・テスト用の正本
//!
//! 1 つの Mutex の中で「条件判定 + 書き込み」を完結させるので、
//! `update_if` は SQL の `UPDATE ... WHERE status = ... RETURNING` と同じく
//! アトミックな compare-and-swap になる。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{NewTask, TaskId, TaskRecord, TaskType};
use crate::ports::{
    Clock, Insertion, StoreError, TaskFilter, TaskPatch, TaskStore, UpdateCondition,
};

#[derive(Default)]
struct StoreState {
    /// All task records (single source of truth).
    records: HashMap<TaskId, TaskRecord>,

    /// Unique index on (type, submission_key).
    by_submission_key: HashMap<(TaskType, String), TaskId>,
}

/// InMemoryTaskStore は TaskStore の in-memory 実装
///
/// `created_at` / `updated_at` は注入された Clock で打刻する（SQL の `NOW()` 相当）。
pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            clock,
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert_if_absent(&self, task: NewTask) -> Result<Insertion, StoreError> {
        let mut state = self.state.lock().await;
        let key = (task.task_type.clone(), task.submission_key.clone());

        if let Some(existing) = state
            .by_submission_key
            .get(&key)
            .and_then(|id| state.records.get(id))
        {
            return Ok(Insertion {
                record: existing.clone(),
                created: false,
            });
        }

        let record = TaskRecord::new(task, self.clock.now());
        state.by_submission_key.insert(key, record.id);
        state.records.insert(record.id, record.clone());
        Ok(Insertion {
            record,
            created: true,
        })
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.records.get(&id).cloned())
    }

    async fn update_if(
        &self,
        id: TaskId,
        condition: &UpdateCondition,
        patch: TaskPatch,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let Some(record) = state.records.get_mut(&id) else {
            return Ok(0);
        };
        if !condition.matches(record) {
            return Ok(0);
        }
        patch.apply(record, self.clock.now());
        Ok(1)
    }

    async fn list(
        &self,
        filter: &TaskFilter,
        limit: usize,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut matched: Vec<&TaskRecord> = state
            .records
            .values()
            .filter(|record| filter.matches(record))
            .collect();
        matched.sort_by_key(|record| (record.created_at, record.id));
        Ok(matched.into_iter().take(limit).cloned().collect())
    }
}
