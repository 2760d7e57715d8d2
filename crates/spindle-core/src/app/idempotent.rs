//! Idempotent side effects via the ledger.
//!
//! The claim protocol only stops *concurrent* double execution. A worker that
//! crashes after the effect but before the status write gets the task
//! re-executed, so handlers with external effects go through `run_once`.

use std::future::Future;

use tracing::{debug, warn};

use crate::domain::{HandlerError, OperationKind, TaskId};
use crate::ports::{Ledger, LedgerError, PutOutcome};

/// Perform `effect` at most once per (task_id, operation).
///
/// 1. entry exists -> return its captured result, effect is not run
/// 2. otherwise run the effect, record its result, return it
///
/// Ledger failures are retryable: nothing has been proven yet and the task
/// record is untouched.
pub async fn run_once<F, Fut>(
    ledger: &dyn Ledger,
    task_id: TaskId,
    operation: &OperationKind,
    effect: F,
) -> Result<serde_json::Value, HandlerError>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send,
{
    if let Some(entry) = ledger
        .get(task_id, operation)
        .await
        .map_err(ledger_unavailable)?
    {
        debug!(%task_id, %operation, "side effect already recorded; replaying result");
        return Ok(entry.result);
    }

    let result = effect().await?;

    match ledger
        .put(task_id, operation, result)
        .await
        .map_err(ledger_unavailable)?
    {
        PutOutcome::Recorded(entry) => Ok(entry.result),
        PutOutcome::AlreadyRecorded(entry) => {
            warn!(%task_id, %operation, "another execution recorded this effect first");
            Ok(entry.result)
        }
    }
}

fn ledger_unavailable(e: LedgerError) -> HandlerError {
    HandlerError::retryable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryLedger;
    use crate::ports::SystemClock;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ulid::Ulid;

    #[tokio::test]
    async fn effect_runs_once_across_repeated_executions() {
        let ledger = InMemoryLedger::new(Arc::new(SystemClock));
        let task_id = TaskId::from_ulid(Ulid::new());
        let op = OperationKind::new("email.send");
        let calls = AtomicUsize::new(0);

        let mut results = Vec::new();
        for _ in 0..2 {
            let result = run_once(&ledger, task_id, &op, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!({ "message_id": format!("msg-{n}") }))
            })
            .await
            .unwrap();
            results.push(result);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0], json!({ "message_id": "msg-1" }));
    }

    #[tokio::test]
    async fn failed_effect_records_nothing() {
        let ledger = InMemoryLedger::new(Arc::new(SystemClock));
        let task_id = TaskId::from_ulid(Ulid::new());
        let op = OperationKind::new("payment.charge");

        let err = run_once(&ledger, task_id, &op, || async {
            Err(HandlerError::retryable("gateway timeout"))
        })
        .await
        .unwrap_err();
        assert!(err.is_retryable());
        assert!(ledger.get(task_id, &op).await.unwrap().is_none());
    }

    struct DownLedger;

    #[async_trait]
    impl Ledger for DownLedger {
        async fn get(
            &self,
            _task_id: TaskId,
            _operation: &OperationKind,
        ) -> Result<Option<crate::domain::LedgerEntry>, LedgerError> {
            Err(LedgerError::Unavailable("connection refused".to_string()))
        }

        async fn put(
            &self,
            _task_id: TaskId,
            _operation: &OperationKind,
            _result: serde_json::Value,
        ) -> Result<PutOutcome, LedgerError> {
            Err(LedgerError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn unreachable_ledger_is_retryable_and_skips_the_effect() {
        let calls = AtomicUsize::new(0);
        let err = run_once(
            &DownLedger,
            TaskId::from_ulid(Ulid::new()),
            &OperationKind::new("email.send"),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!(null))
            },
        )
        .await
        .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
