use crate::error::{ErrorKind, ExecutionError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How the delay grows between attempts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Constant,
    Linear,
    #[default]
    Exponential,
}

/// Re-invokes an operation on classified failures with backoff.
///
/// Only errors whose [`ErrorKind`] is in the retryable set consume
/// retry budget; anything else is returned from the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    jitter: f64,
    strategy: BackoffStrategy,
    retryable: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    /// Exponential policy retrying connection errors and timeouts.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: 0.0,
            strategy: BackoffStrategy::Exponential,
            retryable: vec![ErrorKind::Connection, ErrorKind::Timeout],
        }
    }

    /// A policy that runs the operation exactly once.
    pub fn none() -> Self {
        Self::new(0)
    }

    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Jitter factor, clamped to 0.0-1.0.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_retryable(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.retryable = kinds;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_retryable(&self, err: &ExecutionError) -> bool {
        self.retryable.contains(&err.kind())
    }

    /// Delay before retry number `attempt` (0-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64().max(0.0);
        let delay = match self.strategy {
            BackoffStrategy::Constant => initial,
            BackoffStrategy::Linear => initial * f64::from(attempt + 1),
            BackoffStrategy::Exponential => {
                initial * self.backoff_factor.powf(f64::from(attempt))
            }
        };
        let delay = if delay.is_finite() { delay.min(max) } else { max };
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// [`base_delay`](Self::base_delay) perturbed uniformly by
    /// `±delay * jitter`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt).as_secs_f64();
        if self.jitter <= 0.0 || delay <= 0.0 {
            return Duration::from_secs_f64(delay);
        }
        let offset =
            rand::thread_rng().gen_range(-1.0..=1.0) * delay * self.jitter;
        Duration::from_secs_f64((delay + offset).max(0.0))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    pub async fn run<F, Fut, T>(&self, op: F) -> Result<T, ExecutionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        self.run_with_result_check(op, |_| false).await
    }

    /// Like [`run`](Self::run), but a successful value for which
    /// `retry_if` returns `true` is also retried. When the budget runs
    /// out on such a value, the last value is returned as `Ok`.
    ///
    /// Errors that outlive the budget come back wrapped in
    /// [`ExecutionError::MaxRetriesExceeded`], except with a zero budget:
    /// no retry was attempted, so the error is returned unchanged.
    pub async fn run_with_result_check<F, Fut, T, P>(
        &self,
        mut op: F,
        retry_if: P,
    ) -> Result<T, ExecutionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
        P: Fn(&T) -> bool,
    {
        let mut retries_used = 0u32;

        loop {
            let attempt = retries_used + 1;
            match op().await {
                Ok(value) => {
                    if !retry_if(&value) {
                        return Ok(value);
                    }
                    if retries_used >= self.max_retries {
                        debug!(
                            attempt,
                            "retry budget spent on retryable result, \
                             returning last result"
                        );
                        return Ok(value);
                    }
                    let delay = self.backoff_delay(retries_used);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "result marked retryable, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) if self.is_retryable(&err) => {
                    if retries_used >= self.max_retries {
                        if self.max_retries == 0 {
                            return Err(err);
                        }
                        warn!(attempt, error = %err, "retries exhausted");
                        return Err(ExecutionError::MaxRetriesExceeded {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.backoff_delay(retries_used);
                    warn!(
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed (retryable), retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    debug!(attempt, error = %err, "attempt failed (non-retryable)");
                    return Err(err);
                }
            }
            retries_used += 1;
        }
    }
}
