/// Resilience helpers shared by backend services
///
/// - **Retry**: bounded attempts with linear backoff, a retryable-error
///   predicate and a per-attempt observer
/// - **Timeout**: deadlines for fallible async operations
///
/// # Example: Database write with retry
///
/// ```rust,no_run
/// use resilience::{with_retry, RetryConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let config = RetryConfig::linear(3, Duration::from_secs(1));
///
///     let result = with_retry(&config, || async {
///         // Your database write
///         Ok::<_, String>(())
///     }).await;
/// }
/// ```
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use retry::{with_retry, with_retry_observed, AttemptOutcome, RetryConfig, RetryError};
pub use timeout::{with_deadline, Elapsed};
