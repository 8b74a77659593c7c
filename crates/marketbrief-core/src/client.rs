//! Rate-limited retry client for flaky remote calls.
//!
//! Wraps an arbitrary fetch closure with the global rate gate and bounded
//! exponential-backoff retry. Failures never escape this boundary: the
//! caller sees `Some(value)` or `None`, and decides about fallback.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::error::FetchError;
use crate::retry::{RetryPolicy, TransientClassifier};
use crate::throttle::RateGate;

/// Boxed future returned by a fetch closure.
pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send>>;

/// Zero-argument fetch closure. The core knows nothing about HTTP or any
/// specific provider; the closure owns its own transport and timeout.
pub type FetchFn<T> = Box<dyn Fn() -> FetchFuture<T> + Send + Sync>;

/// Remote-call wrapper combining the rate gate, retry policy, and transient
/// classifier. Cloning shares the gate, so every clone respects the same
/// process-wide spacing.
#[derive(Clone, Default)]
pub struct FetchClient {
    gate: RateGate,
    policy: RetryPolicy,
    classifier: Arc<TransientClassifier>,
}

impl FetchClient {
    pub fn new(gate: RateGate, policy: RetryPolicy, classifier: TransientClassifier) -> Self {
        Self {
            gate,
            policy,
            classifier: Arc::new(classifier),
        }
    }

    /// Invoke `fetch` with rate limiting and retry.
    ///
    /// The gate is acquired before every attempt, including retries.
    /// Transient failures back off and retry while attempts remain;
    /// non-transient failures stop immediately. Exhaustion logs the final
    /// error and returns `None`.
    pub async fn call_with_retry<T, F>(&self, fetch: F) -> Option<T>
    where
        F: Fn() -> FetchFuture<T>,
    {
        let max_retries = self.policy.max_retries;
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=max_retries {
            self.gate.acquire().await;
            let err = match fetch().await {
                Ok(value) => return Some(value),
                Err(err) => err,
            };

            if self.classifier.is_transient(&err) && attempt < max_retries {
                let delay = self.policy.backoff.delay(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient fetch failure, retrying after backoff"
                );
                last_error = Some(err);
                tokio::time::sleep(delay).await;
                continue;
            }

            last_error = Some(err);
            break;
        }

        if let Some(err) = last_error {
            error!(error = %err, "fetch failed, retries exhausted or error not retryable");
        }
        None
    }

    /// Run several fetches with bounded concurrency, preserving input order.
    ///
    /// The bound caps in-flight logical fetches; the shared gate still
    /// serializes the underlying remote calls.
    pub async fn call_many<T>(
        &self,
        fetches: Vec<FetchFn<T>>,
        max_concurrent: usize,
    ) -> Vec<Option<T>>
    where
        T: Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let total = fetches.len();
        let mut tasks = JoinSet::new();

        for (index, fetch) in fetches.into_iter().enumerate() {
            let client = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .expect("fan-out semaphore is never closed");
                (index, client.call_with_retry(|| fetch()).await)
            });
        }

        let mut results: Vec<Option<T>> = Vec::with_capacity(total);
        results.resize_with(total, || None);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = result,
                Err(join_error) => error!(%join_error, "fan-out fetch task failed"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_client(max_retries: u32) -> FetchClient {
        FetchClient::new(
            RateGate::new(Duration::from_millis(1)),
            RetryPolicy {
                max_retries,
                backoff: Backoff::Fixed {
                    delay: Duration::from_millis(1),
                },
            },
            TransientClassifier::default(),
        )
    }

    fn flaky_fetch(
        failures: u32,
        message: &'static str,
        calls: Arc<AtomicU32>,
    ) -> impl Fn() -> FetchFuture<u32> {
        move || -> FetchFuture<u32> {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                if attempt < failures {
                    Err(FetchError::new(message))
                } else {
                    Ok(attempt)
                }
            })
        }
    }

    #[tokio::test]
    async fn success_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = fast_client(3);

        let result = client
            .call_with_retry(flaky_fetch(0, "", Arc::clone(&calls)))
            .await;

        assert_eq!(result, Some(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = fast_client(3);

        let result = client
            .call_with_retry(flaky_fetch(2, "connection reset by peer", Arc::clone(&calls)))
            .await;

        assert_eq!(result, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_transient_failure_uses_all_attempts_then_none() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = fast_client(3);

        let result = client
            .call_with_retry(flaky_fetch(u32::MAX, "read timed out", Arc::clone(&calls)))
            .await;

        assert_eq!(result, None);
        // max_retries + 1 attempts in total
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_transient_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = fast_client(3);

        let result = client
            .call_with_retry(flaky_fetch(u32::MAX, "403 forbidden", Arc::clone(&calls)))
            .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn call_many_preserves_input_order() {
        let client = fast_client(0);

        let fetches: Vec<FetchFn<u32>> = (0u32..5)
            .map(|value| {
                let fetch: FetchFn<u32> = Box::new(move || -> FetchFuture<u32> {
                    Box::pin(async move {
                        if value == 2 {
                            Err(FetchError::new("permanent failure"))
                        } else {
                            Ok(value * 10)
                        }
                    })
                });
                fetch
            })
            .collect();

        let results = client.call_many(fetches, 2).await;

        assert_eq!(
            results,
            vec![Some(0), Some(10), None, Some(30), Some(40)]
        );
    }
}
