//! Status - 集計ビュー（getStats）

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{TaskRecord, TaskStatus};

/// status ごとの件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub success: usize,
    pub failed: usize,
    pub dead: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Success => self.success += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Dead => self.dead += 1,
        }
        self.total += 1;
    }

    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::Success => self.success,
            TaskStatus::Failed => self.failed,
            TaskStatus::Dead => self.dead,
        }
    }
}

/// window 内に作成されたタスクの集計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    #[serde(rename = "window_ms", with = "crate::config::duration_millis")]
    pub window: Duration,
    pub counts: StatusCounts,
    /// SUCCESS / DEAD に到達したものの `updated_at - created_at` 平均
    #[serde(
        rename = "avg_time_to_terminal_ms",
        with = "crate::config::opt_duration_millis"
    )]
    pub avg_time_to_terminal: Option<Duration>,
}

impl TaskStats {
    pub fn from_records(window: Duration, records: &[TaskRecord]) -> Self {
        let mut counts = StatusCounts::default();
        let mut terminal = 0u32;
        let mut total_elapsed = Duration::ZERO;

        for record in records {
            counts.record(record.status);
            if record.status.is_terminal() {
                // 時計が巻き戻っていたら 0 扱い
                let elapsed = (record.updated_at - record.created_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                total_elapsed = total_elapsed.saturating_add(elapsed);
                terminal += 1;
            }
        }

        let avg_time_to_terminal = (terminal > 0).then(|| total_elapsed / terminal);
        Self {
            window,
            counts,
            avg_time_to_terminal,
        }
    }
}
