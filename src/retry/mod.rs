//! Bounded retry with linear backoff and failure classification.
//!
//! Remote operations fail in two ways: transient conditions (network
//! timeouts, server errors, rate limiting) that are worth retrying, and
//! fatal conditions (authentication, validation) that will not heal on
//! their own. The controller retries only transient errors, up to a
//! configured number of total attempts, sleeping `backoff_base * n` after
//! the n-th failed attempt. Attempt counts are reported to the caller for
//! ledger accounting regardless of outcome.

use std::thread;
use std::time::Duration;

use tracing::warn;

/// Classification of an error as transient (retryable) or fatal.
pub trait Retryable {
    /// True if retrying the operation may succeed.
    fn is_transient(&self) -> bool;
}

/// Retry limits shared by every wrapped operation in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay for linear backoff.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
        }
    }

    /// Delay before the attempt following `completed_attempts` failures.
    pub fn backoff_delay(&self, completed_attempts: u32) -> Duration {
        self.backoff_base * completed_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
        }
    }
}

/// Terminal retry failure, carrying the attempts consumed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: std::fmt::Display + std::fmt::Debug,
{
    /// A fatal error short-circuited the retry loop.
    #[error("fatal error after {attempts} attempt(s): {error}")]
    Fatal { error: E, attempts: u32 },

    /// Transient errors consumed every allowed attempt.
    #[error("retries exhausted after {attempts} attempt(s): {last_error}")]
    Exhausted { last_error: E, attempts: u32 },
}

impl<E> RetryError<E>
where
    E: std::fmt::Display + std::fmt::Debug,
{
    /// Attempts consumed before the operation was given up on.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } => *attempts,
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The underlying error (last error seen, for exhausted retries).
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal { error, .. } => error,
            RetryError::Exhausted { last_error, .. } => last_error,
        }
    }
}

/// Runs fallible operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `op` until it succeeds, fails fatally, or exhausts the policy.
    ///
    /// On success returns the value and the attempts consumed (>= 1).
    pub fn run<T, E, F>(&self, operation: &str, op: F) -> Result<(T, u32), RetryError<E>>
    where
        E: Retryable + std::fmt::Display + std::fmt::Debug,
        F: FnMut() -> Result<T, E>,
    {
        self.run_with_sleeper(operation, op, thread::sleep)
    }

    /// Like [`run`](Self::run) with an injectable sleep, so tests can
    /// observe backoff delays without waiting them out.
    pub fn run_with_sleeper<T, E, F, S>(
        &self,
        operation: &str,
        mut op: F,
        mut sleep: S,
    ) -> Result<(T, u32), RetryError<E>>
    where
        E: Retryable + std::fmt::Display + std::fmt::Debug,
        F: FnMut() -> Result<T, E>,
        S: FnMut(Duration),
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match op() {
                Ok(value) => return Ok((value, attempts)),
                Err(error) if !error.is_transient() => {
                    return Err(RetryError::Fatal { error, attempts });
                }
                Err(error) => {
                    if attempts >= self.policy.max_attempts {
                        return Err(RetryError::Exhausted {
                            last_error: error,
                            attempts,
                        });
                    }
                    let delay = self.policy.backoff_delay(attempts);
                    warn!(
                        operation,
                        attempt = attempts,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient failure, backing off"
                    );
                    sleep(delay);
                }
            }
        }
    }
}
