//! Ledger port - 副作用の冪等性台帳
//!
//! handler は外部副作用（メール送信、決済など）の前に台帳を確認し、
//! 記録済みならその結果を返して副作用を繰り返さない。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{LedgerEntry, OperationKind, TaskId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a write-once `put`.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    Recorded(LedgerEntry),
    /// An entry already existed; it was left untouched.
    AlreadyRecorded(LedgerEntry),
}

impl PutOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            PutOutcome::Recorded(entry) | PutOutcome::AlreadyRecorded(entry) => entry,
        }
    }
}

/// Ledger は (task_id, operation) ごとに一度だけ書かれる
///
/// エントリは更新も削除もされない（タスクより長生きする）。
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get(
        &self,
        task_id: TaskId,
        operation: &OperationKind,
    ) -> Result<Option<LedgerEntry>, LedgerError>;

    async fn put(
        &self,
        task_id: TaskId,
        operation: &OperationKind,
        result: serde_json::Value,
    ) -> Result<PutOutcome, LedgerError>;
}
