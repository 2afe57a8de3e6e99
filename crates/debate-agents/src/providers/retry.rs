//! Bounded retry executor for a single backend.
//!
//! Retries only retriable errors, waits either the server-signalled delay or
//! the policy's backoff, and gives up (returning the last error) when the
//! retry count or the cumulative wait budget would be exceeded.

use std::future::Future;
use std::time::Duration;

use coordination::RetryPolicy;
use tracing::{debug, warn};

use super::errors::ProviderError;

pub async fn run_with_retry<T, F, Fut>(
    backend: &str,
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut retries = 0u32;
    let mut waited = Duration::ZERO;

    loop {
        let err = match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retriable() {
            debug!(backend, error = %err, category = %err.retry_category(), "Not retrying");
            return Err(err);
        }
        if !policy.should_retry(retries) {
            warn!(backend, retries, error = %err, "Retry budget exhausted");
            return Err(err);
        }

        let delay = policy.delay_for(retries + 1, err.retry_after());
        if !policy.fits_wait_budget(waited, delay) {
            warn!(
                backend,
                retries,
                waited_ms = waited.as_millis() as u64,
                "Retry wait budget exhausted"
            );
            return Err(err);
        }

        retries += 1;
        warn!(
            backend,
            retry = retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying backend call"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        waited += delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rate_limited(after_ms: Option<u64>) -> ProviderError {
        ProviderError::RateLimited {
            retry_after: after_ms.map(Duration::from_millis),
            message: "429".into(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry("test", &RetryPolicy::immediate(3), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ProviderError::Provider("flaky".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_quota_never_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry("test", &RetryPolicy::immediate(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::QuotaExhausted("out of credit".into()))
        })
        .await;
        assert!(matches!(result, Err(ProviderError::QuotaExhausted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unavailable_not_retried_in_place() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry("test", &RetryPolicy::immediate(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Unavailable("down".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry("test", &RetryPolicy::immediate(2), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(rate_limited(None))
        })
        .await;
        assert!(matches!(result, Err(ProviderError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_honours_retry_after_within_budget() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff_ms: 10,
            backoff_multiplier: 2.0,
            max_backoff_ms: 1_000,
            max_total_wait_ms: 1_500,
        };
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = run_with_retry("test", &policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(rate_limited(Some(700)))
        })
        .await;
        // 700 + 700 fits in 1500; a third wait would not
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(1_400));
    }
}
