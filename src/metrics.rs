/// Metrics for Steeple
///
/// Prometheus counters and histograms covering:
/// - HTTP request counts and latencies
/// - Moderation actions and report intake
/// - Push delivery (messages, failed batches, disabled tokens)
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "steeple_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "steeple_http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    /// Active HTTP requests
    pub static ref HTTP_REQUESTS_ACTIVE: IntGauge = register_int_gauge!(
        "steeple_http_requests_active",
        "Number of HTTP requests currently being processed"
    )
    .unwrap();

    // ========== Moderation Metrics ==========

    pub static ref MODERATION_ACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "steeple_moderation_actions_total",
        "Total number of moderation actions",
        &["action", "target_type"]
    )
    .unwrap();

    pub static ref REPORTS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "steeple_reports_created_total",
        "Total number of reports created",
        &["target_type"]
    )
    .unwrap();

    pub static ref IMPERSONATION_LINKS_TOTAL: IntCounter = register_int_counter!(
        "steeple_impersonation_links_total",
        "Total number of impersonation links issued"
    )
    .unwrap();

    // ========== Push Metrics ==========

    pub static ref PUSH_MESSAGES_SENT_TOTAL: IntCounter = register_int_counter!(
        "steeple_push_messages_sent_total",
        "Total number of push messages accepted by the gateway"
    )
    .unwrap();

    pub static ref PUSH_BATCHES_FAILED_TOTAL: IntCounter = register_int_counter!(
        "steeple_push_batches_failed_total",
        "Total number of push batches rejected by the gateway"
    )
    .unwrap();

    pub static ref PUSH_TOKENS_DISABLED_TOTAL: IntCounter = register_int_counter!(
        "steeple_push_tokens_disabled_total",
        "Total number of device tokens disabled after delivery receipts"
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "steeple_background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "steeple_background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

/// Record a moderation action
pub fn record_moderation_action(action: &str, target_type: &str) {
    MODERATION_ACTIONS_TOTAL
        .with_label_values(&[action, target_type])
        .inc();
}

/// Record a report
pub fn record_report_created(target_type: &str) {
    REPORTS_CREATED_TOTAL
        .with_label_values(&[target_type])
        .inc();
}

pub fn record_push_sent(messages: usize) {
    PUSH_MESSAGES_SENT_TOTAL.inc_by(messages as u64);
}

pub fn record_push_batch_failed() {
    PUSH_BATCHES_FAILED_TOTAL.inc();
}

pub fn record_tokens_disabled(count: usize) {
    PUSH_TOKENS_DISABLED_TOTAL.inc_by(count as u64);
}
