//! Bounded retry with linear backoff
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Unit of backoff; the wait after attempt `n` is `n * base_delay`
    pub base_delay: Duration,
    /// Upper bound for a single wait
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Linear backoff with the given attempt ceiling and unit delay
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    /// Wait applied after the failed `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.max(1))
            .min(self.max_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Report handed to the observer after every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// 1-based attempt number
    pub attempt: u32,
    pub succeeded: bool,
    /// Whether another attempt follows this one
    pub will_retry: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },
    #[error("non-retryable failure on attempt {attempt}: {error}")]
    Aborted { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before the error was returned
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Aborted { attempt, .. } => *attempt,
        }
    }

    /// The error of the last attempt
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Aborted { error, .. } => error,
        }
    }
}

/// Execute a future with retry logic, retrying every error
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_observed(config, f, |_| true, |_| {}).await
}

/// Execute a future with retry logic.
///
/// `should_retry` decides whether an error is transient. `observe` runs once per
/// attempt, successful or not, before any backoff sleep.
pub async fn with_retry_observed<F, Fut, T, E, P, O>(
    config: &RetryConfig,
    mut f: F,
    should_retry: P,
    mut observe: O,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
    O: FnMut(AttemptOutcome),
{
    let max_attempts = config.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match f().await {
            Ok(result) => {
                observe(AttemptOutcome {
                    attempt,
                    succeeded: true,
                    will_retry: false,
                });
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                let retryable = should_retry(&e);
                let will_retry = retryable && attempt < max_attempts;
                observe(AttemptOutcome {
                    attempt,
                    succeeded: false,
                    will_retry,
                });

                if !retryable {
                    return Err(RetryError::Aborted { attempt, error: e });
                }

                if !will_retry {
                    warn!(attempts = attempt, error = %e, "Max attempts reached");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }

                let delay = config.delay_after(attempt);
                warn!(
                    "Retry attempt {}/{} failed ({}), waiting {:?}",
                    attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
