//! Errors - handler エラーと分類
//!
//! handler の失敗は必ずどちらかに分類される:
//! - Transient: 一時的なエラー（リトライ推奨）
//! - Permanent: 恒久的なエラー（リトライ無意味、即 dead-letter）

use thiserror::Error;

use super::TaskType;

/// ErrorKind は handler エラーの運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
}

/// HandlerError は handler が返す失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Network hiccup, upstream timeout, ...
    #[error("{0}")]
    Retryable(String),

    /// Malformed payload, constraint violation, unknown task type, ...
    #[error("{0}")]
    NonRetryable(String),
}

impl HandlerError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::NonRetryable(message.into())
    }

    pub fn missing_field(field: &str) -> Self {
        Self::NonRetryable(format!("missing required field `{field}`"))
    }

    pub fn unknown_task_type(task_type: &TaskType, available: &[String]) -> Self {
        Self::NonRetryable(format!(
            "unknown task type: {task_type}. available types: {}",
            available.join(", ")
        ))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::Retryable(_) => ErrorKind::Transient,
            HandlerError::NonRetryable(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
