//! Analytics telemetry for storage attempts
//!
//! Recording never blocks and never fails the caller: events go into a bounded
//! queue drained by a single worker, and a full queue drops the event.
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AnalyticsConfig;
use crate::metrics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryEvent {
    pub event: String,
    /// Distinct id of the actor (email or account id)
    pub subject: String,
    pub success: bool,
    pub attempt: u32,
}

/// Fire-and-forget recording surface used by request paths
pub trait Telemetry: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Destination drained by the telemetry worker
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn capture(&self, event: &TelemetryEvent) -> anyhow::Result<()>;
}

/// Bounded queue in front of a [`TelemetrySink`]
#[derive(Clone)]
pub struct TelemetryQueue {
    tx: mpsc::Sender<TelemetryEvent>,
}

impl TelemetryQueue {
    /// Start the worker. It stops once every queue handle is dropped.
    pub fn start(sink: Arc<dyn TelemetrySink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<TelemetryEvent>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = sink.capture(&event).await {
                    warn!(event = %event.event, error = %e, "Telemetry delivery failed");
                }
            }
            debug!("Telemetry worker stopped");
        });

        (Self { tx }, handle)
    }
}

impl Telemetry for TelemetryQueue {
    fn record(&self, event: TelemetryEvent) {
        if let Err(e) = self.tx.try_send(event) {
            metrics::TELEMETRY_DROPPED_TOTAL.inc();
            debug!("Telemetry event dropped: {}", e);
        }
    }
}

/// Capture client for a PostHog-compatible analytics endpoint
pub struct AnalyticsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl AnalyticsClient {
    pub fn new(endpoint: &str, api_key: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/capture/", endpoint.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl TelemetrySink for AnalyticsClient {
    async fn capture(&self, event: &TelemetryEvent) -> anyhow::Result<()> {
        let payload = json!({
            "api_key": self.api_key,
            "event": event.event,
            "distinct_id": event.subject,
            "properties": {
                "success": event.success,
                "retry_count": event.attempt,
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Sink used when no analytics endpoint is configured
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn capture(&self, event: &TelemetryEvent) -> anyhow::Result<()> {
        debug!(
            event = %event.event,
            subject = %event.subject,
            success = event.success,
            attempt = event.attempt,
            "telemetry"
        );
        Ok(())
    }
}

/// Pick the sink described by configuration
pub fn sink_from_config(config: &AnalyticsConfig) -> anyhow::Result<Arc<dyn TelemetrySink>> {
    match (&config.endpoint, &config.api_key) {
        (Some(endpoint), Some(api_key)) => {
            info!("Analytics capture enabled: {}", endpoint);
            Ok(Arc::new(AnalyticsClient::new(endpoint, api_key)?))
        }
        _ => {
            info!("Analytics endpoint not configured; telemetry is logged only");
            Ok(Arc::new(LogSink))
        }
    }
}
