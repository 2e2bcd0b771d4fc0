//! Exponential backoff retry for the scraper's transient failure classes
//! (spec §4.4 "Retry policy"): base 500 ms, factor 2, cap 8 s, 5 attempts.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ScraperError, Severity};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base: Duration::from_millis(500),
            factor: 2,
            cap: Duration::from_secs(8),
            max_attempts: 5,
        }
    }
}

/// Run `op` up to `policy.max_attempts` times, retrying only on
/// [`Severity::Transient`] errors with exponential backoff between tries.
/// Any non-transient error, or exhaustion of attempts, is returned as-is.
pub async fn with_retry<F, Fut, T>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut delay = policy.base;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.severity() == Severity::Transient && attempt < policy.max_attempts => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(e),
                }
                delay = (delay * policy.factor).min(policy.cap);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result = with_retry(
            RetryPolicy {
                base: Duration::from_millis(1),
                factor: 2,
                cap: Duration::from_millis(10),
                max_attempts: 5,
            },
            &cancel,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ScraperError::TransientNetwork("timeout".into()))
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<(), ScraperError> = with_retry(
            RetryPolicy::default(),
            &cancel,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ScraperError::AuthRequired) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<(), ScraperError> = with_retry(
            RetryPolicy {
                base: Duration::from_millis(1),
                factor: 2,
                cap: Duration::from_millis(5),
                max_attempts: 3,
            },
            &cancel,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ScraperError::RateLimited) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
