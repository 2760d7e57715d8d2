//! Handlers - 組み込みのデモ用 handler 一式
//!
//! `send_email` と `process_payment` は外部副作用を持つので台帳を経由する。
//! 残りは副作用を持たない（何度実行しても同じ結果になる）。

pub mod email;
pub mod failure;
pub mod media;
pub mod notification;
pub mod payment;
pub mod report;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::app::EngineBuilder;
use crate::ports::{Clock, Ledger};
use crate::typed::{RegistryError, Task};

pub use self::email::{LogMailer, Mailer, SendEmail, SendEmailHandler};
pub use self::failure::{TestFailure, TestFailureHandler};
pub use self::media::{ResizeImage, ResizeImageHandler};
pub use self::notification::{SendNotification, SendNotificationHandler};
pub use self::payment::{PaymentGateway, ProcessPayment, ProcessPaymentHandler, SimulatedGateway};
pub use self::report::{GenerateReport, GenerateReportHandler};

/// 数値でも文字列でも受け付ける user 参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Number(u64),
    Text(String),
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRef::Number(n) => write!(f, "{n}"),
            UserRef::Text(s) => f.write_str(s),
        }
    }
}

/// 組み込み handler とその依存
///
/// ```ignore
/// let builtins = Builtins::new(ledger, clock);
/// let engine = builtins.install(EngineBuilder::new())?.build()?;
/// ```
#[derive(Clone)]
pub struct Builtins {
    pub ledger: Arc<dyn Ledger>,
    pub clock: Arc<dyn Clock>,
    pub mailer: Arc<LogMailer>,
    pub gateway: Arc<SimulatedGateway>,
}

impl Builtins {
    pub fn new(ledger: Arc<dyn Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            mailer: Arc::new(LogMailer::default()),
            gateway: Arc::new(SimulatedGateway::default()),
        }
    }

    /// task types installed by `install`, sorted
    pub const TASK_TYPES: [&'static str; 6] = [
        <GenerateReport as Task>::TYPE,
        <ProcessPayment as Task>::TYPE,
        <ResizeImage as Task>::TYPE,
        <SendEmail as Task>::TYPE,
        <SendNotification as Task>::TYPE,
        <TestFailure as Task>::TYPE,
    ];

    pub fn install(&self, builder: EngineBuilder) -> Result<EngineBuilder, RegistryError> {
        builder
            .register::<SendEmail, _>(SendEmailHandler::new(
                Arc::clone(&self.ledger),
                self.mailer.clone(),
            ))?
            .register::<ProcessPayment, _>(ProcessPaymentHandler::new(
                Arc::clone(&self.ledger),
                self.gateway.clone(),
            ))?
            .register::<ResizeImage, _>(ResizeImageHandler)?
            .register::<GenerateReport, _>(GenerateReportHandler::new(Arc::clone(&self.clock)))?
            .register::<SendNotification, _>(SendNotificationHandler)?
            .register::<TestFailure, _>(TestFailureHandler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryLedger;
    use crate::ports::SystemClock;

    #[test]
    fn user_ref_accepts_numbers_and_strings() {
        let n: UserRef = serde_json::from_value(serde_json::json!(42)).unwrap();
        let s: UserRef = serde_json::from_value(serde_json::json!("u-42")).unwrap();
        assert_eq!(n.to_string(), "42");
        assert_eq!(s.to_string(), "u-42");
    }

    #[test]
    fn install_registers_the_whole_catalogue() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let builtins = Builtins::new(Arc::new(InMemoryLedger::new(clock.clone())), clock);
        let engine = builtins
            .install(EngineBuilder::new())
            .unwrap()
            .expect_tasks(&Builtins::TASK_TYPES)
            .build()
            .unwrap();

        assert_eq!(
            engine.context().registry.registered_types(),
            Builtins::TASK_TYPES.map(String::from).to_vec()
        );
    }
}
