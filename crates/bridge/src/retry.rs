//! Retry utilities with exponential backoff for transient RPC and bridge API failures.

use std::{future::Future, time::Duration};

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{BridgeError, RetryClass};

/// Backoff parameters and attempt budgets.
///
/// The general budget (`max_attempts`) covers transient transport failures. The
/// bridge reporting `RO#7` is tracked against `busy_max_attempts` instead, since
/// saturation clears on its own but slowly.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub initial_wait: Duration,
    pub busy_max_attempts: u32,
    pub busy_wait: Duration,
    /// Fraction in `[0, 1)` by which each wait is randomly stretched or shrunk.
    pub jitter: f64,
    cancel: Option<CancellationToken>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
            initial_wait: Duration::from_secs(1),
            busy_max_attempts: 100,
            busy_wait: Duration::from_secs(1),
            jitter: 0.0,
            cancel: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_factor: f64, initial_wait: Duration) -> Self {
        Self {
            max_attempts,
            backoff_factor,
            initial_wait,
            ..Default::default()
        }
    }

    pub fn with_busy_ceiling(mut self, busy_max_attempts: u32, busy_wait: Duration) -> Self {
        self.busy_max_attempts = busy_max_attempts;
        self.busy_wait = busy_wait;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 0.99);
        self
    }

    /// Stops retrying, between attempts, once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Wait after the `attempt`-th failure (1-based): `initial_wait * backoff_factor^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_wait.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    fn jittered(&self, wait: Duration) -> Duration {
        if self.jitter <= 0.0 || wait.is_zero() {
            return wait;
        }
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        wait.mul_f64(factor)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    async fn sleep(&self, wait: Duration) -> Result<(), BridgeError> {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(BridgeError::Cancelled),
                _ = tokio::time::sleep(wait) => Ok(()),
            },
            None => {
                tokio::time::sleep(wait).await;
                Ok(())
            }
        }
    }

    /// Runs `f` until it succeeds, fails fatally, or a budget runs out.
    pub async fn execute<F, Fut, T>(&self, operation: &str, f: F) -> Result<T, BridgeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        self.execute_with(operation, BridgeError::retry_class, f).await
    }

    /// Like [`Self::execute`] with a caller-supplied classification.
    pub async fn execute_with<F, Fut, T, C>(
        &self,
        operation: &str,
        classify: C,
        mut f: F,
    ) -> Result<T, BridgeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
        C: Fn(&BridgeError) -> RetryClass,
    {
        let mut transient_failures = 0u32;
        let mut busy_failures = 0u32;

        loop {
            if self.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }

            let err = match f().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let (failures, budget, wait) = match classify(&err) {
                RetryClass::Fatal => {
                    debug!(operation, error = %err, "non-retryable error, not retrying");
                    return Err(err);
                }
                RetryClass::Transient => {
                    transient_failures += 1;
                    (
                        transient_failures,
                        self.max_attempts,
                        self.backoff(transient_failures),
                    )
                }
                RetryClass::Busy => {
                    busy_failures += 1;
                    (busy_failures, self.busy_max_attempts, self.busy_wait)
                }
            };

            if failures >= budget {
                warn!(
                    operation,
                    attempts = transient_failures + busy_failures,
                    error = %err,
                    "max retries exceeded"
                );
                return Err(BridgeError::RetriesExhausted {
                    attempts: transient_failures + busy_failures,
                    last: Box::new(err),
                });
            }

            let wait = self.jittered(wait);
            warn!(
                operation,
                attempt = failures,
                max_attempts = budget,
                delay_ms = wait.as_millis() as u64,
                error = %err,
                "retryable error, backing off"
            );
            self.sleep(wait).await?;
        }
    }
}
