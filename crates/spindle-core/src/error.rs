use thiserror::Error;

use crate::domain::TaskId;
use crate::ports::{QueueError, StoreError};

/// Errors surfaced by the engine's core operations.
///
/// Handler failures are not here: they never escape a worker and are turned
/// into state transitions instead (see `domain::HandlerError`).
/// A lost conditional write is not an error either; it comes back as an
/// outcome (`ClaimOutcome::AlreadyClaimed`, `ProcessOutcome::CompletionLost`).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad submission input. Nothing was written.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Store or queue unreachable; durable state is untouched.
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl EngineError {
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, EngineError::Infrastructure(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Infrastructure(e.into())
    }
}

impl From<QueueError> for EngineError {
    fn from(e: QueueError) -> Self {
        Self::Infrastructure(e.into())
    }
}
