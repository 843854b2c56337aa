use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::error::ChatError;

/// Bounded exponential backoff: attempt `n` failing waits
/// `initial_delay * backoff_factor^(n-1)` before attempt `n + 1`.
/// No cap, no jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1_000),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_factor,
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Delay slept after the 1-based `attempt` fails. Negative or NaN
    /// factors count as zero; delays too large to represent saturate.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_factor.max(0.0).powi(exponent);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("all {attempts} attempts failed; last error: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_last(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

impl<E: Display> From<RetryError<E>> for ChatError {
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => ChatError::RetryExhausted {
                attempts,
                last: last.to_string(),
            },
        }
    }
}

/// Run `operation` until it succeeds or the policy's attempt budget is spent.
///
/// The operation is not assumed idempotent: a write that committed but then
/// reported failure will be issued again.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                log::warn!("Attempt {attempt}/{max_attempts} failed: {err}; giving up");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                log::warn!(
                    "Attempt {attempt}/{max_attempts} failed: {err}; retrying in {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
