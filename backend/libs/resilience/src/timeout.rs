//! Deadlines for async operations
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// The deadline passed before the operation produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Execute a fallible future with a deadline, folding expiry into the caller's error type.
///
/// The inner future is dropped when the deadline passes, so work it has not
/// committed yet is abandoned.
pub async fn with_deadline<F, T, E>(duration: Duration, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<Elapsed>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(Elapsed(duration).into()),
    }
}
