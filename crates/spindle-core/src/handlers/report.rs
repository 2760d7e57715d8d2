//! generate_report

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::UserRef;
use crate::domain::{HandlerError, TaskId};
use crate::ports::Clock;
use crate::typed::{Handler, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateReport {
    #[serde(alias = "userId")]
    pub user_id: UserRef,
    #[serde(default, alias = "reportType")]
    pub report_type: Option<String>,
}

impl Task for GenerateReport {
    const TYPE: &'static str = "generate_report";
}

pub struct GenerateReportHandler {
    clock: Arc<dyn Clock>,
}

impl GenerateReportHandler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl Handler<GenerateReport> for GenerateReportHandler {
    async fn handle(
        &self,
        task: GenerateReport,
        _task_id: TaskId,
    ) -> Result<serde_json::Value, HandlerError> {
        let report_type = task.report_type.as_deref().unwrap_or("standard");
        Ok(json!({
            "report_url": format!("reports/user_{}_report.pdf", task.user_id),
            "report_type": report_type,
            "generated_at": self.clock.now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ManualClock;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    #[tokio::test]
    async fn report_url_names_the_user() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let handler = GenerateReportHandler::new(Arc::new(ManualClock::new(now)));
        let task: GenerateReport = serde_json::from_value(json!({ "userId": 7 })).unwrap();

        let result = handler
            .handle(task, TaskId::from_ulid(Ulid::new()))
            .await
            .unwrap();
        assert_eq!(result["report_url"], "reports/user_7_report.pdf");
        assert_eq!(result["report_type"], "standard");
        assert_eq!(result["generated_at"], json!(now));
    }

    #[test]
    fn user_id_is_required() {
        let err = serde_json::from_value::<GenerateReport>(json!({ "report_type": "x" }))
            .unwrap_err();
        assert!(err.to_string().contains("user_id"));
    }
}
