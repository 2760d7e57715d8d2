//! Decision model: next action determination after a failed or lost attempt.
//!
//! This module defines the Decision type (what to do next) and the Decider trait
//! (how to determine the next action based on task state and error).

use std::time::Duration;

use super::{HandlerError, RetryPolicy, TaskRecord};

/// The next action to take for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Put the task back to PENDING, eligible again after `delay`.
    Retry { delay: Duration, reason: String },

    /// Mark the task as dead (give up).
    MarkDead { reason: String },
}

/// Trait for deciding the next action based on task state and error.
///
/// Deciders are pure functions: given the current record and the failure,
/// they return the next action without side effects. `task.attempts` is the
/// value *before* the failed attempt is accounted.
pub trait Decider: Send + Sync {
    /// A handler returned an error.
    fn on_failure(&self, task: &TaskRecord, error: &HandlerError) -> Decision;

    /// The worker holding the task went silent past the zombie threshold.
    fn on_worker_lost(&self, task: &TaskRecord) -> Decision;
}

/// Default decider.
///
/// - Non-retryable error: dead immediately
/// - Retryable error: retry while attempts < max_attempts, using RetryPolicy for delay
/// - Lost worker: requeue at once unless that would push attempts beyond max_attempts
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Decider for DefaultDecider {
    fn on_failure(&self, task: &TaskRecord, error: &HandlerError) -> Decision {
        let attempts = task.attempts.saturating_add(1);
        if !error.is_retryable() {
            return Decision::MarkDead {
                reason: format!("non-retryable error on attempt {attempts}: {error}"),
            };
        }
        if attempts >= task.max_attempts {
            return Decision::MarkDead {
                reason: format!("max attempts reached: {}/{}", attempts, task.max_attempts),
            };
        }
        let delay = self.retry_policy.next_delay(attempts);
        Decision::Retry {
            delay,
            reason: format!(
                "retry attempt {}/{} after {:?}",
                attempts + 1,
                task.max_attempts,
                delay
            ),
        }
    }

    fn on_worker_lost(&self, task: &TaskRecord) -> Decision {
        let attempts = task.attempts.saturating_add(1);
        if attempts > task.max_attempts {
            Decision::MarkDead {
                reason: format!(
                    "worker lost mid-execution; attempts exhausted: {}/{}",
                    attempts, task.max_attempts
                ),
            }
        } else {
            Decision::Retry {
                delay: Duration::ZERO,
                reason: format!("worker lost mid-execution; requeued ({attempts} attempts)"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskId, TaskType};
    use chrono::Utc;
    use rstest::rstest;
    use ulid::Ulid;

    fn task(attempts: u32, max_attempts: u32) -> TaskRecord {
        let mut record = TaskRecord::new(
            NewTask {
                id: TaskId::from_ulid(Ulid::new()),
                task_type: TaskType::new("test_failure"),
                payload: serde_json::json!({}),
                submission_key: "k".to_string(),
                max_attempts,
            },
            Utc::now(),
        );
        record.attempts = attempts;
        record
    }

    #[rstest]
    #[case(0, 3, Some(2))]
    #[case(1, 3, Some(4))]
    #[case(2, 3, None)]
    #[case(0, 1, None)]
    #[case(5, 3, None)]
    fn retryable_failures(
        #[case] attempts: u32,
        #[case] max_attempts: u32,
        #[case] expected_delay_secs: Option<u64>,
    ) {
        let decider = DefaultDecider::default();
        let decision = decider.on_failure(
            &task(attempts, max_attempts),
            &HandlerError::retryable("boom"),
        );
        match (decision, expected_delay_secs) {
            (Decision::Retry { delay, .. }, Some(secs)) => {
                assert_eq!(delay, Duration::from_secs(secs))
            }
            (Decision::MarkDead { .. }, None) => {}
            (other, expected) => panic!("unexpected {other:?} (expected delay {expected:?})"),
        }
    }

    #[test]
    fn non_retryable_is_dead_on_first_attempt() {
        let decider = DefaultDecider::default();
        let decision = decider.on_failure(&task(0, 5), &HandlerError::missing_field("to"));
        assert!(matches!(decision, Decision::MarkDead { .. }));
    }

    #[rstest]
    #[case(0, 3, true)]
    #[case(2, 3, true)]
    #[case(3, 3, false)]
    fn lost_worker_requeues_within_budget(
        #[case] attempts: u32,
        #[case] max_attempts: u32,
        #[case] requeued: bool,
    ) {
        let decider = DefaultDecider::default();
        let decision = decider.on_worker_lost(&task(attempts, max_attempts));
        assert_eq!(
            matches!(decision, Decision::Retry { delay, .. } if delay.is_zero()),
            requeued
        );
    }
}
