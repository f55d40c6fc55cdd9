/// Prometheus metrics for the account service
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, Encoder,
    HistogramVec, IntCounter, TextEncoder,
};

lazy_static! {
    /// Account lifecycle operations (labels: operation, status=success|failed)
    pub static ref ACCOUNT_OPERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "account_operations_total",
        "Total number of account lifecycle operations",
        &["operation", "status"]
    )
    .unwrap();

    /// Individual storage attempts, including retries (labels: operation, outcome)
    pub static ref STORE_ATTEMPTS_TOTAL: CounterVec = register_counter_vec!(
        "account_store_attempts_total",
        "Total number of storage unit-of-work attempts",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Session cache lookups (labels: result=hit|miss|error)
    pub static ref TOKEN_CACHE_LOOKUPS_TOTAL: CounterVec = register_counter_vec!(
        "account_token_cache_lookups_total",
        "Session token fast-path cache lookups",
        &["result"]
    )
    .unwrap();

    /// Avatar uploads (labels: status=success|rejected|failed)
    pub static ref AVATAR_UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "account_avatar_uploads_total",
        "Avatar uploads handled by the upload rendezvous",
        &["status"]
    )
    .unwrap();

    /// Failed detached background tasks (labels: task)
    pub static ref BACKGROUND_TASK_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "account_background_task_failures_total",
        "Detached background tasks that returned an error",
        &["task"]
    )
    .unwrap();

    /// Requests rejected by the rate gate
    pub static ref RATE_LIMIT_REJECTIONS_TOTAL: IntCounter = register_int_counter!(
        "account_rate_limit_rejections_total",
        "Requests rejected by the shared rate limiter"
    )
    .unwrap();

    /// Telemetry events dropped because the queue was full
    pub static ref TELEMETRY_DROPPED_TOTAL: IntCounter = register_int_counter!(
        "account_telemetry_dropped_total",
        "Telemetry events dropped before delivery"
    )
    .unwrap();

    /// Operation latency (labels: operation)
    pub static ref OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "account_operation_duration_seconds",
        "Account lifecycle operation latency",
        &["operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();
}

pub fn record_operation(operation: &str, success: bool, elapsed: std::time::Duration) {
    let status = if success { "success" } else { "failed" };
    ACCOUNT_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
    OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(elapsed.as_secs_f64());
}

pub fn record_store_attempt(operation: &str, succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };
    STORE_ATTEMPTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn record_cache_lookup(result: &str) {
    TOKEN_CACHE_LOOKUPS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_upload(status: &str) {
    AVATAR_UPLOADS_TOTAL.with_label_values(&[status]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
