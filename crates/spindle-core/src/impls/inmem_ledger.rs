//! InMemoryLedger - 開発用の冪等性台帳

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{LedgerEntry, OperationKind, TaskId};
use crate::ports::{Clock, Ledger, LedgerError, PutOutcome};

/// InMemoryLedger は (task_id, operation) をキーに一度だけ書ける台帳
pub struct InMemoryLedger {
    entries: Mutex<HashMap<(TaskId, OperationKind), LedgerEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn get(
        &self,
        task_id: TaskId,
        operation: &OperationKind,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(&(task_id, operation.clone())).cloned())
    }

    async fn put(
        &self,
        task_id: TaskId,
        operation: &OperationKind,
        result: serde_json::Value,
    ) -> Result<PutOutcome, LedgerError> {
        let mut entries = self.entries.lock().await;
        match entries.entry((task_id, operation.clone())) {
            Entry::Occupied(existing) => Ok(PutOutcome::AlreadyRecorded(existing.get().clone())),
            Entry::Vacant(slot) => {
                let entry = LedgerEntry {
                    task_id,
                    operation: operation.clone(),
                    result,
                    recorded_at: self.clock.now(),
                };
                slot.insert(entry.clone());
                Ok(PutOutcome::Recorded(entry))
            }
        }
    }
}
