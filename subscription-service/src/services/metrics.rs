//! Metrics module for subscription-service.
//! Provides Prometheus metrics for token and subscription operations.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "subscription_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Token operations counter
pub static TOKEN_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Subscription operations counter
pub static SUBSCRIPTION_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Tokens flipped to inactive by the reaper
pub static TOKENS_REAPED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    TOKEN_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_token_operations_total",
                "Total token operations by operation and outcome"
            ),
            &["operation", "outcome"]
        )
        .expect("Failed to register TOKEN_OPERATIONS_TOTAL")
    });

    SUBSCRIPTION_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_operations_total",
                "Total subscription operations by operation and outcome"
            ),
            &["operation", "outcome"]
        )
        .expect("Failed to register SUBSCRIPTION_OPERATIONS_TOTAL")
    });

    TOKENS_REAPED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_tokens_reaped_total",
                "Expired tokens deactivated by the background reaper"
            ),
            &["trigger"]
        )
        .expect("Failed to register TOKENS_REAPED_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a token operation.
pub fn record_token_operation(operation: &str, outcome: &str) {
    if let Some(counter) = TOKEN_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}

/// Record a subscription operation.
pub fn record_subscription_operation(operation: &str, outcome: &str) {
    if let Some(counter) = SUBSCRIPTION_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}

/// Record tokens deactivated by a sweep.
pub fn record_tokens_reaped(trigger: &str, count: u64) {
    if let Some(counter) = TOKENS_REAPED_TOTAL.get() {
        counter.with_label_values(&[trigger]).inc_by(count);
    }
}
