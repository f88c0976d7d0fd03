//! Exponential backoff with jitter for transient failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::Retryable;

/// How hard to retry a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry `attempt` (0-based): `base * 2^attempt`, capped,
    /// plus up to half again as jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(1 << attempt.min(6));
        let capped = exponential.min(self.max_delay);
        let spread = capped.as_millis() as u64 / 2;
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        capped + Duration::from_millis(jitter)
    }
}

/// Run `op`, retrying errors classified as transient.
///
/// Non-transient errors (including rate limits) come back on first sight.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                warn!(
                    op = op_name,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::GenerationError;
    use crate::usage::LimitReason;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };
        let first = policy.delay_for(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        let second = policy.delay_for(1);
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(300));
        let capped = policy.delay_for(10);
        assert!(capped >= Duration::from_millis(300) && capped <= Duration::from_millis(450));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, GenerationError> = with_retry(&fast(), "test", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(GenerationError::Transient("503".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), GenerationError> = with_retry(&fast(), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GenerationError::Transient("timeout".into()))
        })
        .await;
        assert!(matches!(result, Err(GenerationError::Transient(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rate_limits_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), GenerationError> = with_retry(&fast(), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GenerationError::RateLimited {
                reason: LimitReason::DailyLimit,
                retry_after: None,
            })
        })
        .await;
        assert!(matches!(result, Err(GenerationError::RateLimited { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_retries_policy() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let _ = with_retry(&RetryPolicy::no_retries(), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(GenerationError::Transient("reset".into()))
        })
        .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
