//! test_failure - 常に retryable で失敗する（dead-letter の確認用）

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{HandlerError, TaskId};
use crate::typed::{Handler, Task};

/// Any JSON object is accepted as payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestFailure {}

impl Task for TestFailure {
    const TYPE: &'static str = "test_failure";
}

pub struct TestFailureHandler;

#[async_trait]
impl Handler<TestFailure> for TestFailureHandler {
    async fn handle(
        &self,
        _task: TestFailure,
        _task_id: TaskId,
    ) -> Result<serde_json::Value, HandlerError> {
        Err(HandlerError::retryable("simulated transient failure"))
    }
}
