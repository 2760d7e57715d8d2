//! Ledger entries: proof that a side effect already happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TaskId;

/// Which side effect an entry proves (e.g. `email.send`, `payment.charge`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKind(String);

impl OperationKind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Written once per (task, operation); never updated or deleted.
///
/// `result` holds enough of the effect's output to rebuild the handler result
/// without repeating the effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub task_id: TaskId,
    pub operation: OperationKind,
    pub result: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}
