use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use chargeguard_core_types::{PortalError, PortalResult};
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Bounded retry with capped exponential backoff.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
    pub retryable_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            max_jitter: Duration::from_millis(500),
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1`, never above `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        exponential.saturating_add(jitter).min(self.max_delay)
    }

    /// Status-bearing failures retry only on the configured statuses; failures
    /// with no response retry; every other typed error surfaces immediately.
    pub fn should_retry(&self, err: &PortalError) -> bool {
        match err.status() {
            Some(status) => self.retryable_statuses.contains(&status),
            None => err.is_transport_failure(),
        }
    }

    /// Runs `call` until it succeeds, fails permanently, or `max_retries`
    /// retries are spent. `call` receives the zero-based attempt number.
    pub async fn run<F, Fut, T>(&self, operation: &str, mut call: F) -> PortalResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = PortalResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match call(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempts = attempt + 1, "portal call recovered");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !self.should_retry(&err) {
                        return Err(err);
                    }
                    if attempt >= self.max_retries {
                        warn!(
                            operation,
                            attempts = attempt + 1,
                            status = ?err.status(),
                            error = %err,
                            "portal call failed after exhausting retries"
                        );
                        return Err(err);
                    }
                    let delay = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        status = ?err.status(),
                        error = %err,
                        "retrying portal call"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        for attempt in 0..20 {
            assert!(policy.backoff(attempt) <= policy.max_delay);
        }
        let no_jitter = RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(no_jitter.backoff(0), Duration::from_secs(1));
        assert_eq!(no_jitter.backoff(2), Duration::from_secs(4));
        assert_eq!(no_jitter.backoff(10), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn always_unavailable_makes_max_retries_plus_one_attempts() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let result: PortalResult<()> = policy
            .run("test", |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(PortalError::from_status(503, "unavailable")) }
            })
            .await;

        assert!(matches!(
            result,
            Err(PortalError::TransientNetwork {
                status: Some(503),
                ..
            })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), policy.max_retries + 1);
        assert!(started.elapsed() <= policy.max_delay * policy.max_retries);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_fail_fast() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);
        let result: PortalResult<()> = policy
            .run("test", |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(PortalError::from_status(422, "invalid evidence")) }
            })
            .await;
        assert!(matches!(result, Err(PortalError::PermanentClient { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_are_retried_until_success() {
        let policy = RetryPolicy::default();
        let result = policy
            .run("test", |attempt| async move {
                if attempt < 2 {
                    Err(PortalError::transient("connection reset"))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn untyped_auth_failures_are_not_retried() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);
        let result: PortalResult<()> = policy
            .run("test", |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(PortalError::authentication("token endpoint refused")) }
            })
            .await;
        assert!(result.unwrap_err().is_authentication());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
