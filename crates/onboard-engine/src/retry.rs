//! Bounded retry with exponential backoff for catalogue and resource server calls.
//!
//! A [`RetryPolicy`] is immutable once built and shared behind an `Arc` by every
//! central-store write and every compensation. Each call to [`RetryPolicy::execute`]
//! is an independent execution that ends in exactly one [`RetryOutcome`].

use onboard_client::StoreError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::metrics::RepairMetrics;

/// Classifies a failure. Plain function pointers keep the policy `Clone + Debug`.
pub type Predicate = fn(&StoreError) -> bool;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Hard cap on the number of attempts, the first one included (default: 5).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 1s).
    pub backoff_floor: Duration,
    /// Upper bound on any single delay (default: 10s).
    pub backoff_ceiling: Duration,
    /// Growth factor between consecutive delays (default: 2.0).
    pub backoff_multiplier: f64,
    /// Add up to 50% random jitter, still bounded by the ceiling (default: true).
    pub jitter: bool,
    /// Failures worth another attempt.
    pub retry_on: Predicate,
    /// Failures that stop the execution at once, whatever attempts remain.
    pub abort_on: Predicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_floor: Duration::from_secs(1),
            backoff_ceiling: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
            retry_on: StoreError::is_recoverable,
            abort_on: StoreError::is_unrecoverable,
        }
    }
}

/// Terminal state of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    /// The operation succeeded.
    Success(T),
    /// The attempt cap was reached, or the last failure was not retryable.
    Exhausted {
        /// The last error that occurred.
        last_error: StoreError,
        /// Total number of attempts made.
        attempts: u32,
    },
    /// The abort predicate matched.
    Aborted {
        /// The failure that triggered the abort.
        error: StoreError,
        /// Total number of attempts made.
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// Collapse into a plain result, dropping the attempt count.
    pub fn into_result(self) -> Result<T, StoreError> {
        match self {
            RetryOutcome::Success(value) => Ok(value),
            RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
            RetryOutcome::Aborted { error, .. } => Err(error),
        }
    }

    /// Whether the execution ended in success.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success(_))
    }
}

impl RetryPolicy {
    /// Run `operation` until it succeeds, aborts, or runs out of attempts.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.run(None, operation).await
    }

    /// Same as `execute` but counts every retry on `metrics`.
    pub async fn execute_with_metrics<F, Fut, T>(
        &self,
        metrics: &RepairMetrics,
        operation: F,
    ) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.run(Some(metrics), operation).await
    }

    async fn run<F, Fut, T>(&self, metrics: Option<&RepairMetrics>, operation: F) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(value) => return RetryOutcome::Success(value),
                Err(e) => e,
            };

            if (self.abort_on)(&error) {
                tracing::warn!(attempt, error = %error, "unrecoverable failure, not retrying");
                return RetryOutcome::Aborted {
                    error,
                    attempts: attempt,
                };
            }

            if !(self.retry_on)(&error) || attempt >= max_attempts {
                return RetryOutcome::Exhausted {
                    last_error: error,
                    attempts: attempt,
                };
            }

            let backoff = self.compute_backoff(attempt - 1);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = backoff.as_millis() as u64,
                error = %error,
                "call failed, retrying"
            );
            if let Some(metrics) = metrics {
                metrics.record_retry();
            }
            tokio::time::sleep(backoff).await;
        }
    }

    /// Delay before retry number `retry` (0-based).
    ///
    /// `floor * multiplier^retry`, capped at the ceiling. Jitter adds up to half
    /// of the computed delay and is capped as well.
    pub fn compute_backoff(&self, retry: u32) -> Duration {
        let floor_ms = self.backoff_floor.as_millis() as f64;
        let ceiling_ms = self.backoff_ceiling.max(self.backoff_floor).as_millis() as f64;
        let multiplier = self.backoff_multiplier.max(1.0);

        let computed = floor_ms * multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let capped = computed.min(ceiling_ms);

        let total = if self.jitter && capped >= 2.0 {
            let extra = rand::thread_rng().gen_range(0.0..capped / 2.0);
            (capped + extra).min(ceiling_ms)
        } else {
            capped
        };
        Duration::from_millis(total as u64)
    }
}
