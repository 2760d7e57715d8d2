//! send_notification

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::UserRef;
use crate::domain::{HandlerError, TaskId};
use crate::typed::{Handler, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendNotification {
    #[serde(alias = "userId")]
    pub user_id: UserRef,
    pub message: String,
}

impl Task for SendNotification {
    const TYPE: &'static str = "send_notification";
}

pub struct SendNotificationHandler;

#[async_trait]
impl Handler<SendNotification> for SendNotificationHandler {
    async fn handle(
        &self,
        task: SendNotification,
        task_id: TaskId,
    ) -> Result<serde_json::Value, HandlerError> {
        if task.message.trim().is_empty() {
            return Err(HandlerError::missing_field("message"));
        }
        info!(%task_id, user_id = %task.user_id, "notification delivered");
        Ok(json!({ "delivered": true, "user_id": task.user_id }))
    }
}
