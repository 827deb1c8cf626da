//! Bounded retry with exponential backoff.
//!
//! The controller does not classify failures: every `Err` is retried the
//! same way. Whether a step may be retried at all is decided by its
//! [`RetryMode`](crate::purchase_flow::RetryMode); single-attempt steps never
//! reach this module.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::SagaError;

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first one). Zero is
    /// treated as one.
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles for each later attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// A policy that tries once and never waits.
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Effective number of attempts.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

/// Outcome of [`RetryController::execute`].
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The first success, or the last failure.
    pub outcome: Result<T, SagaError>,
    /// Attempts actually made.
    pub attempts: u32,
}

impl<T> RetryResult<T> {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn cancellable_sleep(
    cancel: &CancellationToken,
    delay: Duration,
) -> Result<(), SagaError> {
    if cancel.is_cancelled() {
        return Err(SagaError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SagaError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Runs operations under a [`RetryPolicy`], aborting waits on cancellation.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls `operation` until it succeeds or the attempts run out.
    ///
    /// `name` only labels logs and metrics. A cancellation during a backoff
    /// wait ends the loop with [`SagaError::Cancelled`] and the attempts
    /// made so far.
    pub async fn execute<T, F, Fut>(&self, name: &str, mut operation: F) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SagaError>>,
    {
        let max_attempts = self.policy.attempts();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            tracing::info!(operation = name, attempt, max_attempts, "attempt started");

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation = name, attempt, "succeeded after retry");
                    }
                    return RetryResult {
                        outcome: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    tracing::warn!(operation = name, attempt, max_attempts, error = %err, "attempt failed");
                    last_error = Some(err);

                    if attempt < max_attempts {
                        let delay = self.policy.backoff_delay(attempt);
                        metrics::counter!("saga_step_retries_total", "step" => name.to_string())
                            .increment(1);
                        tracing::info!(
                            operation = name,
                            retry_in_ms = delay.as_millis() as u64,
                            "waiting before next attempt"
                        );
                        if let Err(cancelled) = cancellable_sleep(&self.cancel, delay).await {
                            tracing::warn!(operation = name, attempt, "retry aborted by cancellation");
                            return RetryResult {
                                outcome: Err(cancelled),
                                attempts: attempt,
                            };
                        }
                    }
                }
            }
        }

        tracing::error!(operation = name, max_attempts, "operation failed after all attempts");
        RetryResult {
            outcome: Err(last_error.unwrap_or_else(|| {
                SagaError::Internal(format!("{name} made no attempts"))
            })),
            attempts: max_attempts,
        }
    }
}
