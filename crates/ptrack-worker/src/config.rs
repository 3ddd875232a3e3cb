use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How many times a transport failure is retried before the record is
/// marked `FAILED`, and how long to wait in between.
///
/// Business rejections are never retried.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total ledger submissions per record, including the first (at least 1).
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// One attempt; the first transport failure is terminal.
    pub fn fail_fast() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Up to `attempts` submissions with exponential backoff.
    pub fn retry_then_fail(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before attempt `attempt + 1`, given that `attempt` (1-based)
    /// just failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            multiplier: 2,
        }
    }
}

/// Verification worker settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub retry: RetryPolicy,
    /// Topic receiving events whose retries were exhausted. `None` disables
    /// dead-lettering.
    pub dead_letter_topic: Option<String>,
    /// Pause after a store outage before the event is redelivered.
    pub store_retry_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            dead_letter_topic: None,
            store_retry_backoff_ms: 1_000,
        }
    }
}

impl WorkerConfig {
    pub fn store_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.store_retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            multiplier: 2,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(60), Duration::from_millis(1_000));
    }

    #[test]
    fn named_policies() {
        assert_eq!(RetryPolicy::fail_fast().max_attempts(), 1);
        assert_eq!(RetryPolicy::retry_then_fail(4).max_attempts(), 4);
        assert_eq!(RetryPolicy::retry_then_fail(0).max_attempts(), 1);
    }

    #[test]
    fn partial_worker_config() {
        let c: WorkerConfig =
            serde_json::from_str(r#"{"dead_letter_topic": "product.create.dlq"}"#).unwrap();
        assert_eq!(c.dead_letter_topic.as_deref(), Some("product.create.dlq"));
        assert_eq!(c.retry, RetryPolicy::default());
    }
}
