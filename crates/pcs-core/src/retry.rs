//! Bounded-retry wrapper shared by every provider adapter.
//!
//! Grounded on `models.py`'s `RetryStrategy` and `hubic.py`'s `NoRetryStrategy`:
//! a request is retried while it fails with [`StorageError::Retriable`], up to
//! a maximum number of attempts, sleeping an exponential backoff (or an
//! explicit delay attached to the error) between attempts.

use std::future::Future;

use rand::Rng;
use tracing::warn;

use crate::domain::errors::StorageError;

/// Retries a fallible async operation according to a bounded exponential
/// backoff policy.
///
/// Instances are immutable and shared across every request an adapter makes.
#[derive(Debug, Clone, Copy)]
pub struct RetryStrategy {
    nb_tries_max: u32,
    first_sleep_secs: f64,
    /// When true, `invoke_retry` calls `request` exactly once and returns
    /// whatever it produced, `Retriable` wrapper and all, instead of
    /// unwrapping or retrying it.
    passthrough: bool,
}

impl RetryStrategy {
    pub fn new(nb_tries_max: u32, first_sleep_secs: f64) -> Self {
        RetryStrategy {
            nb_tries_max,
            first_sleep_secs,
            passthrough: false,
        }
    }

    /// A strategy that calls `request` exactly once and never unwraps
    /// [`StorageError::Retriable`]. Used by adapters (hubiC's Swift client)
    /// that perform their own outer retry loop and just need the inner
    /// component to report "this was retriable" rather than retry itself.
    pub fn no_retry() -> Self {
        RetryStrategy {
            nb_tries_max: 1,
            first_sleep_secs: 0.0,
            passthrough: true,
        }
    }

    /// Invokes `request` until it succeeds, fails with a non-retriable error,
    /// or the attempt budget is exhausted.
    pub async fn invoke_retry<T, F, Fut>(&self, mut request: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        if self.passthrough {
            return request().await;
        }
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match request().await {
                Ok(value) => return Ok(value),
                Err(StorageError::Retriable { cause, delay }) => {
                    if attempt >= self.nb_tries_max {
                        warn!(attempt, "aborting after repeated failures: {cause}");
                        return Err(*cause);
                    }
                    warn!(attempt, "will retry after failed request: {cause}");
                    self.wait(attempt, delay).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn wait(&self, attempt: u32, explicit_delay: Option<f64>) {
        let duration = explicit_delay.unwrap_or_else(|| {
            let jitter = rand::thread_rng().gen_range(0.5..1.5);
            self.first_sleep_secs * jitter * 2f64.powi(attempt as i32 - 1)
        });
        if duration > 0.0 {
            tokio::time::sleep(std::time::Duration::from_secs_f64(duration)).await;
        }
    }
}

impl Default for RetryStrategy {
    /// Three attempts, starting with a one-second backoff: a reasonable
    /// default for interactive CLI use.
    fn default() -> Self {
        RetryStrategy::new(3, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let strategy = RetryStrategy::new(3, 0.0);
        let result = strategy.invoke_retry(|| async { Ok::<_, StorageError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let strategy = RetryStrategy::new(3, 0.0);
        let attempts = AtomicU32::new(0);
        let result = strategy
            .invoke_retry(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(StorageError::Generic("boom".into()).retriable_after(0.0))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let strategy = RetryStrategy::new(2, 0.0);
        let result: Result<(), _> = strategy
            .invoke_retry(|| async {
                Err(StorageError::Generic("persistent".into()).retriable_after(0.0))
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn non_retriable_error_is_not_retried() {
        let strategy = RetryStrategy::new(5, 0.0);
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = strategy
            .invoke_retry(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(StorageError::Generic("fatal".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_retry_strategy_calls_once_and_keeps_retriable_wrapper() {
        let strategy = RetryStrategy::no_retry();
        let result: Result<(), _> = strategy
            .invoke_retry(|| async {
                Err(StorageError::Generic("keep wrapped".into()).retriable_after(0.0))
            })
            .await;
        assert!(matches!(result, Err(StorageError::Retriable { .. })));
    }
}
