//! process_payment - 課金は台帳で一度きり

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
pub struct ProcessPayment {
    pub amount: f64,
    #[serde(alias = "customerId")]
    pub customer_id: String,
}

impl Task for ProcessPayment {
    const TYPE: &'static str = "process_payment";
}

/// Charges a customer. Returns the gateway's transaction id.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, customer_id: &str, amount: f64) -> Result<String, HandlerError>;
}

#[derive(Debug, Default)]
pub struct SimulatedGateway {
    charges: AtomicU64,
}

impl SimulatedGateway {
    pub fn charges(&self) -> u64 {
        self.charges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, customer_id: &str, amount: f64) -> Result<String, HandlerError> {
        let n = self.charges.fetch_add(1, Ordering::SeqCst) + 1;
        info!(%customer_id, amount, "payment charged");
        Ok(format!("txn_{n:06}"))
    }
}

pub struct ProcessPaymentHandler {
    ledger: Arc<dyn Ledger>,
    gateway: Arc<dyn PaymentGateway>,
}

impl ProcessPaymentHandler {
    pub fn new(ledger: Arc<dyn Ledger>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { ledger, gateway }
    }
}

#[async_trait]
impl Handler<ProcessPayment> for ProcessPaymentHandler {
    async fn handle(
        &self,
        task: ProcessPayment,
        task_id: TaskId,
    ) -> Result<serde_json::Value, HandlerError> {
        if !task.amount.is_finite() || task.amount <= 0.0 {
            return Err(HandlerError::non_retryable(format!(
                "amount must be a positive number, got {}",
                task.amount
            )));
        }
        if task.customer_id.trim().is_empty() {
            return Err(HandlerError::missing_field("customer_id"));
        }
        let op = OperationKind::new("payment.charge");

        run_once(self.ledger.as_ref(), task_id, &op, || async {
            let transaction_id = self.gateway.charge(&task.customer_id, task.amount).await?;
            Ok(json!({
                "transaction_id": transaction_id,
                "amount": task.amount,
                "status": "completed",
            }))
        })
        .await
    }
}
