// =============================================================================
// METRICS MODULE
// =============================================================================
// This module sets up Prometheus metrics for observability.
//
// LEARNING NOTES:
// - Prometheus uses a "pull" model - it scrapes the /metrics endpoint
// - Counter: only goes up (snapshots processed, alerts fired)
// - Gauge: can go up or down (stalls in a theft condition, log size)
// - Histogram: distribution of values in buckets (latency)
// - The metrics macros are no-ops until a recorder is installed, so library
//   code and tests can call the helpers freely
// =============================================================================

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::models::ClassifiedState;

// =============================================================================
// METRIC NAMES
// =============================================================================

/// Labels: method, endpoint, status
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Labels: state (stolen/low/normal)
pub const SNAPSHOTS_PROCESSED_TOTAL: &str = "stall_snapshots_processed_total";

pub const THEFT_ALERTS_FIRED_TOTAL: &str = "theft_alerts_fired_total";

/// Fired theft alerts that found no notification consumer
pub const THEFT_NOTIFICATIONS_DROPPED_TOTAL: &str = "theft_notifications_dropped_total";

/// Stalls currently in an unacknowledged theft condition
pub const THEFT_DEDUP_ACTIVE_STALLS: &str = "theft_dedup_active_stalls";

pub const SNAPSHOT_STREAM_ERRORS_TOTAL: &str = "snapshot_stream_errors_total";

pub const ALERT_LOG_ENTRIES: &str = "alert_log_entries";

pub const ALERT_LOG_EVICTIONS_TOTAL: &str = "alert_log_evictions_total";

/// Labels: operation (append/load/clear)
pub const ALERT_LOG_STORAGE_ERRORS_TOTAL: &str = "alert_log_storage_errors_total";

/// Labels: operation (append/load)
pub const ALERT_LOG_OPERATION_DURATION_SECONDS: &str = "alert_log_operation_duration_seconds";

// =============================================================================
// SETUP FUNCTION
// =============================================================================
/// Install the Prometheus recorder globally and return the render handle
pub fn setup_metrics() -> Result<PrometheusHandle> {
    let latency_buckets = &[
        0.0005, // 0.5ms
        0.001,  // 1ms
        0.005,  // 5ms
        0.01,   // 10ms
        0.025,  // 25ms
        0.05,   // 50ms
        0.1,    // 100ms
        0.25,   // 250ms
        0.5,    // 500ms
        1.0,    // 1 second
        2.5,    // 2.5 seconds
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(ALERT_LOG_OPERATION_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request latency in seconds");
    describe_counter!(
        SNAPSHOTS_PROCESSED_TOTAL,
        "Stall snapshots processed, by classified state"
    );
    describe_counter!(
        THEFT_ALERTS_FIRED_TOTAL,
        "Theft alerts fired (one per contiguous stolen run of a stall)"
    );
    describe_counter!(
        THEFT_NOTIFICATIONS_DROPPED_TOTAL,
        "Theft alerts fired while no notification consumer was running"
    );
    describe_gauge!(
        THEFT_DEDUP_ACTIVE_STALLS,
        "Stalls currently in an unacknowledged theft condition"
    );
    describe_counter!(
        SNAPSHOT_STREAM_ERRORS_TOTAL,
        "Snapshot subscription failures"
    );
    describe_gauge!(ALERT_LOG_ENTRIES, "Entries in the alert log after the last operation");
    describe_counter!(
        ALERT_LOG_EVICTIONS_TOTAL,
        "Alert log entries evicted by the retention window"
    );
    describe_counter!(
        ALERT_LOG_STORAGE_ERRORS_TOTAL,
        "Alert log storage failures, by operation"
    );
    describe_histogram!(
        ALERT_LOG_OPERATION_DURATION_SECONDS,
        "Alert log operation latency in seconds"
    );

    Ok(handle)
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

pub fn record_snapshot(state: ClassifiedState) {
    counter!(SNAPSHOTS_PROCESSED_TOTAL, "state" => state.as_str()).increment(1);
}

pub fn record_theft_alert() {
    counter!(THEFT_ALERTS_FIRED_TOTAL).increment(1);
}

pub fn record_notification_dropped() {
    counter!(THEFT_NOTIFICATIONS_DROPPED_TOTAL).increment(1);
}

pub fn set_dedup_active(count: usize) {
    gauge!(THEFT_DEDUP_ACTIVE_STALLS).set(count as f64);
}

pub fn record_stream_error() {
    counter!(SNAPSHOT_STREAM_ERRORS_TOTAL).increment(1);
}

pub fn set_alert_log_entries(count: usize) {
    gauge!(ALERT_LOG_ENTRIES).set(count as f64);
}

pub fn record_alert_log_evictions(count: usize) {
    counter!(ALERT_LOG_EVICTIONS_TOTAL).increment(count as u64);
}

pub fn record_storage_error(operation: &'static str) {
    counter!(ALERT_LOG_STORAGE_ERRORS_TOTAL, "operation" => operation).increment(1);
}

pub fn record_alert_log_operation(operation: &'static str, duration_secs: f64) {
    histogram!(ALERT_LOG_OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(duration_secs);
}
