//! Bounded-retry wrapper around account units of work
use resilience::{with_retry_observed, RetryConfig, RetryError};
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use super::StoreError;
use crate::metrics;
use crate::services::telemetry::{Telemetry, TelemetryEvent};

/// Re-runs a whole unit of work on backend failures.
///
/// Each unit of work is expected to open and commit its own transaction (every
/// [`AccountStore`](super::AccountStore) method does), so a retried attempt never
/// observes partial writes from a failed one. Every attempt is reported to the
/// telemetry sink with its number and outcome.
#[derive(Clone)]
pub struct RetryableTransaction {
    config: RetryConfig,
    telemetry: Arc<dyn Telemetry>,
}

impl RetryableTransaction {
    pub fn new(config: RetryConfig, telemetry: Arc<dyn Telemetry>) -> Self {
        Self { config, telemetry }
    }

    pub async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        subject: &str,
        unit_of_work: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let result = with_retry_observed(
            &self.config,
            unit_of_work,
            StoreError::is_transient,
            |outcome| {
                metrics::record_store_attempt(operation, outcome.succeeded);
                self.telemetry.record(TelemetryEvent {
                    event: operation.to_string(),
                    subject: subject.to_string(),
                    success: outcome.succeeded,
                    attempt: outcome.attempt,
                });
            },
        )
        .await;

        result.map_err(|e| {
            if let RetryError::Exhausted { attempts, .. } = &e {
                warn!(operation, attempts, "Storage operation exhausted its retries");
            }
            e.into_inner()
        })
    }
}
