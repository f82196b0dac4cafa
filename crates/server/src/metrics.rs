//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the optipress server:
//! - HTTP request metrics (latency, counts, in-flight)
//! - Image serving metrics (what was served, negotiated format)
//! - Conversion and batch status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "optipress_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("optipress_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "optipress_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Requests rejected by the rate limiter.
pub static RATE_LIMITED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "optipress_rate_limited_total",
            "Requests rejected by the serving-path rate limiter",
        ),
        &["path"],
    )
    .unwrap()
});

// =============================================================================
// Image Serving Metrics
// =============================================================================

/// Images served, by negotiated format and how the body was obtained.
///
/// `source` is one of `artifact`, `on_demand`, `original`, `fallback`.
pub static IMAGES_SERVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("optipress_images_served_total", "Images served"),
        &["format", "source"],
    )
    .unwrap()
});

/// Conditional requests answered with 304 Not Modified.
pub static NOT_MODIFIED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "optipress_not_modified_total",
            "Conditional requests answered with 304",
        ),
        &["validator"],
    )
    .unwrap()
});

// =============================================================================
// Conversion Metrics (collected dynamically)
// =============================================================================

/// Whether a batch is running (1) or not (0).
pub static BATCH_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "optipress_batch_running",
        "Whether a batch conversion run is active (1) or not (0)",
    )
    .unwrap()
});

/// Successful conversions since startup.
pub static CONVERSIONS_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "optipress_conversions_total",
        "Successful conversions since startup",
    )
    .unwrap()
});

/// Failed conversions since startup.
pub static CONVERSION_FAILURES_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "optipress_conversion_failures_total",
        "Failed conversions since startup",
    )
    .unwrap()
});

/// Bytes saved by conversions since startup.
pub static SPACE_SAVED_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "optipress_space_saved_bytes",
        "Bytes saved by conversions since startup",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(RATE_LIMITED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(IMAGES_SERVED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(NOT_MODIFIED_TOTAL.clone()))
        .unwrap();
    registry.register(Box::new(BATCH_RUNNING.clone())).unwrap();
    registry
        .register(Box::new(CONVERSIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(CONVERSION_FAILURES_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(SPACE_SAVED_BYTES.clone()))
        .unwrap();
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    BATCH_RUNNING.set(if state.scheduler().is_running() { 1 } else { 0 });

    let stats = state.optimizer().stats();
    CONVERSIONS_TOTAL.set((stats.conversions + stats.on_demand_conversions) as i64);
    CONVERSION_FAILURES_TOTAL.set(stats.failures as i64);
    SPACE_SAVED_BYTES.set(stats.space_saved as i64);
}

/// Normalize a path for metric labels.
///
/// Media paths carry arbitrary user filenames; collapsing them keeps the
/// label cardinality bounded.
pub fn normalize_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/media/") {
        if !rest.is_empty() {
            return "/media/{path}".to_string();
        }
    }
    path.to_string()
}
