//! Retry logic for package source requests.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

use crate::error::PackageError;

/// Retry policy applied to source lookups.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// Executes an async operation with retry logic.
///
/// Only transient source failures are retried; every other error is returned
/// immediately.
pub async fn with_retry<F, Fut, T>(
    policy: RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<T, PackageError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, PackageError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => {
                debug!("{}: non-retryable error: {}", operation_name, e);
                return Err(e);
            }
            Err(e) if attempt >= attempts => {
                warn!("{}: giving up after {} attempt(s): {}", operation_name, attempt, e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}...",
                    operation_name, attempt, attempts, e, policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    fn transient() -> PackageError {
        PackageError::SourceUnavailable {
            feed: "feed".into(),
            message: "connection reset".into(),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(fast(), "lookup", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(fast(), "lookup", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert_eq!(result, Err(transient()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(fast(), "lookup", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PackageError::not_found("core"))
        })
        .await;
        assert!(matches!(result, Err(PackageError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_none_policy_runs_once() {
        let calls = AtomicUsize::new(0);
        let _: Result<(), _> = with_retry(RetryPolicy::none(), "lookup", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
