//! Retry with exponential backoff for transient storage errors
//!
//! Only the initiating CRUD paths retry; background cleanup runs each pass
//! once and relies on the next sweep instead. Non-transient errors pass
//! through untouched on the first attempt.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy for content-mutating operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each further retry
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based)
    fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(retry)
    }
}

/// Whether an error is worth retrying: connection-level sqlx failures, not
/// constraint violations or decode problems.
pub fn is_transient(error: &anyhow::Error) -> bool {
    match error.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Io(_)) => true,
        Some(sqlx::Error::PoolTimedOut) => true,
        Some(sqlx::Error::PoolClosed) => true,
        Some(sqlx::Error::WorkerCrashed) => true,
        _ => false,
    }
}

/// Run `op`, retrying transient failures with exponential backoff.
///
/// Returns the last error once attempts are exhausted; non-transient errors
/// are returned immediately.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !is_transient(&e) {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt - 1);
                tracing::warn!(
                    "Transient storage error (attempt {}/{}), retrying in {:?}: {:#}",
                    attempt,
                    policy.max_attempts,
                    delay,
                    e
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient_error() -> anyhow::Error {
        anyhow::Error::new(sqlx::Error::PoolTimedOut)
    }

    fn permanent_error() -> anyhow::Error {
        anyhow::anyhow!("row violates constraint")
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<i32> = with_retries(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_from_transient() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<i32> = with_retries(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient_error())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<i32> = with_retries(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient_error()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<i32> = with_retries(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(permanent_error()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_is_transient_classification() {
        assert!(is_transient(&transient_error()));
        assert!(is_transient(&anyhow::Error::new(sqlx::Error::Io(
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")
        ))));
        assert!(!is_transient(&permanent_error()));
        assert!(!is_transient(&anyhow::Error::new(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(50),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    }
}
