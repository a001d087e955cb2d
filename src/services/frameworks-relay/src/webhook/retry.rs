//! # Delivery Retry
//!
//! Bounded in-request retries for calls to the marketing API. Delays grow
//! exponentially from the initial backoff, are capped at the maximum backoff
//! and are optionally randomized by +/-25%. Only errors reporting
//! [`RelayError::is_retryable`] are attempted again.

use crate::config::DeliveryConfig;
use crate::error::{RelayError, RelayResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(retry as i32);
        let mut delay_ms = base.min(self.max_delay.as_millis() as f64);

        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.75..=1.25);
            delay_ms *= factor;
        }

        Duration::from_millis(delay_ms as u64)
    }

    /// Run `operation` until it succeeds, fails permanently or attempts run out
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> RelayResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = RelayResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, error = %err, "Giving up after retries");
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(1500),
            multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(10), Duration::from_millis(1500));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            ..RetryPolicy::default()
        };

        for _ in 0..50 {
            let delay = policy.delay_for(0).as_millis();
            assert!((750..=1250).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = fast_policy(3)
            .run("test", |_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(RelayError::external_api("klaviyo", 503, "unavailable"))
                    } else {
                        Ok("delivered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "delivered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: RelayResult<()> = fast_policy(5)
            .run("test", |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RelayError::external_api("klaviyo", 400, "bad request"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: RelayResult<()> = fast_policy(3)
            .run("test", |attempt| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RelayError::timeout("klaviyo", attempt as u64))
                }
            })
            .await;

        assert!(matches!(result, Err(RelayError::Timeout { seconds: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_policy_from_config() {
        let config = DeliveryConfig {
            max_attempts: 0,
            ..DeliveryConfig::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }
}
