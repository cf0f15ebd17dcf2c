//! Exponential-backoff retry for transient upstream failures.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Retry schedule: `max_attempts` tries with delays of `base_delay * 2^n`
/// between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or the policy
/// is exhausted. `is_retryable` inspects the error of a failed attempt.
///
/// The backoff sleep is an ordinary `tokio::time::sleep`, so dropping the
/// returned future cancels the retry loop immediately.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let last = attempt + 1 >= policy.max_attempts;
                if last || !is_retryable(&err) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                debug!(service = label, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// HTTP status codes treated as transient.
pub fn transient_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestErr {
        retryable: bool,
    }

    impl std::fmt::Display for TestErr {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestErr> =
            retry_with_backoff(RetryPolicy::default(), "test", |e: &TestErr| e.retryable, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestErr { retryable: true })
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestErr> =
            retry_with_backoff(RetryPolicy::default(), "test", |e: &TestErr| e.retryable, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestErr { retryable: false })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestErr> =
            retry_with_backoff(RetryPolicy::default(), "test", |e: &TestErr| e.retryable, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestErr { retryable: true })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn transient_statuses() {
        for code in [429, 500, 502, 503, 504] {
            assert!(transient_status(code), "{code} should be transient");
        }
        for code in [400, 401, 403, 404, 422] {
            assert!(!transient_status(code), "{code} should not be transient");
        }
    }
}
