use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Exponential Backoff Retry
// ============================================================================
//
// Used by the outbox relay when delivering events. Errors that report
// themselves as permanent stop the loop on the first attempt.
//
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Attempts per delivery, the first one included
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no backoff.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after a failed attempt, capped at `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = Duration::from_millis((current.as_millis() as f64 * self.multiplier) as u64);
        next.min(self.max_delay)
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Every attempt failed with a transient error
    Exhausted { error: E, attempts: u32 },
    /// Failed with an error that retrying cannot fix
    Permanent(E),
}

/// Whether an error may go away on its own.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
pub async fn retry_on_transient<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return RetryResult::Success(value);
            }
            Err(error) if !error.is_transient() => {
                tracing::error!(error = %error, "Permanent failure, not retrying");
                return RetryResult::Permanent(error);
            }
            Err(error) if attempt >= max_attempts => {
                tracing::warn!(attempt, error = %error, "Giving up after final attempt");
                return RetryResult::Exhausted { error, attempts: attempt };
            }
            Err(error) => {
                tracing::debug!(
                    attempt,
                    max_attempts,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying after delay"
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
