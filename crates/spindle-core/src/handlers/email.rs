//! send_email - 台帳で二重送信を防ぐ

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::app::idempotent::run_once;
use crate::domain::{HandlerError, OperationKind, TaskId};
use crate::ports::Ledger;
use crate::typed::{Handler, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmail {
    pub to: String,
    #[serde(default)]
    pub subject: Option<String>,
}

impl Task for SendEmail {
    const TYPE: &'static str = "send_email";
}

/// Outbound mail transport. Returns the provider's message id.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str) -> Result<String, HandlerError>;
}

/// Logs instead of sending. Counts deliveries so tests can assert on them.
#[derive(Debug, Default)]
pub struct LogMailer {
    sent: AtomicU64,
}

impl LogMailer {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str) -> Result<String, HandlerError> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        info!(%to, %subject, "email sent");
        Ok(format!("msg-{n}"))
    }
}

pub struct SendEmailHandler {
    ledger: Arc<dyn Ledger>,
    mailer: Arc<dyn Mailer>,
}

impl SendEmailHandler {
    pub fn new(ledger: Arc<dyn Ledger>, mailer: Arc<dyn Mailer>) -> Self {
        Self { ledger, mailer }
    }
}

#[async_trait]
impl Handler<SendEmail> for SendEmailHandler {
    async fn handle(
        &self,
        task: SendEmail,
        task_id: TaskId,
    ) -> Result<serde_json::Value, HandlerError> {
        if task.to.trim().is_empty() {
            return Err(HandlerError::missing_field("to"));
        }
        let subject = task.subject.as_deref().unwrap_or("No subject");
        let op = OperationKind::new("email.send");

        run_once(self.ledger.as_ref(), task_id, &op, || async {
            let message_id = self.mailer.send(&task.to, subject).await?;
            Ok(json!({ "sent": true, "to": task.to, "message_id": message_id }))
        })
        .await
    }
}
