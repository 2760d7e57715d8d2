//! Engine configuration.
//!
//! Every field has a default, so a partial TOML/JSON document deserializes
//! into a complete config. Durations are written in milliseconds
//! (`zombie_threshold_ms = 60000`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::RetryPolicy;

/// Configuration for workers, reaper and retry policy.
///
/// ```ignore
/// let config = EngineConfig::default()
///     .workers(8)
///     .zombie_threshold(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of worker loops popping the delivery queue.
    pub workers: usize,

    /// Heartbeat age after which an IN_PROGRESS task is presumed orphaned.
    #[serde(rename = "zombie_threshold_ms", with = "duration_millis")]
    pub zombie_threshold: Duration,

    /// How often the reaper sweeps.
    #[serde(rename = "reaper_interval_ms", with = "duration_millis")]
    pub reaper_interval: Duration,

    /// Age after which a PENDING task is assumed to have lost its notification.
    #[serde(rename = "pending_grace_ms", with = "duration_millis")]
    pub pending_grace: Duration,

    /// Pause after a store/queue failure before the loop resumes.
    #[serde(rename = "infra_backoff_ms", with = "duration_millis")]
    pub infra_backoff: Duration,

    /// Extra tries of a failed completion write, each after `infra_backoff`.
    pub completion_retries: u32,

    /// Used when a submission does not name `max_attempts`.
    pub default_max_attempts: u32,

    /// Max records handled per reaper sweep (each sweep separately).
    pub reap_batch: usize,

    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            zombie_threshold: Duration::from_secs(60),
            reaper_interval: Duration::from_secs(300),
            pending_grace: Duration::from_secs(60),
            infra_backoff: Duration::from_secs(5),
            completion_retries: 5,
            default_max_attempts: 3,
            reap_batch: 500,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn zombie_threshold(mut self, threshold: Duration) -> Self {
        self.zombie_threshold = threshold;
        self
    }

    pub fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    pub fn pending_grace(mut self, grace: Duration) -> Self {
        self.pending_grace = grace;
        self
    }

    pub fn infra_backoff(mut self, backoff: Duration) -> Self {
        self.infra_backoff = backoff;
        self
    }

    pub fn completion_retries(mut self, retries: u32) -> Self {
        self.completion_retries = retries;
        self
    }

    pub fn default_max_attempts(mut self, max_attempts: u32) -> Self {
        self.default_max_attempts = max_attempts;
        self
    }

    pub fn reap_batch(mut self, batch: usize) -> Self {
        self.reap_batch = batch;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        // 0 だと store 障害中に worker が空回りする
        if self.infra_backoff.is_zero() {
            return Err("infra_backoff must be non-zero".to_string());
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(format!(
                "retry.multiplier must be a finite number >= 1.0, got {}",
                self.retry.multiplier
            ));
        }
        if self.default_max_attempts == 0 {
            return Err("default_max_attempts must be at least 1".to_string());
        }
        if self.reaper_interval.is_zero() {
            return Err("reaper_interval must be non-zero".to_string());
        }
        if self.reap_batch == 0 {
            return Err("reap_batch must be at least 1".to_string());
        }
        Ok(())
    }
}

pub(crate) mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

pub(crate) mod opt_duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis().min(u64::MAX as u128) as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
