//! Metric name constants and recording helpers

use std::time::Instant;

use opentelemetry::metrics::Histogram;

/// Record a duration measurement on a histogram
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[opentelemetry::KeyValue]) {
    let duration = start.elapsed().as_secs_f64();
    histogram.record(duration, attributes);
}

/// Per-call counter with `tool`, `context`, `success`, and `outcome`
/// attributes; `success` is the boolean rollup, `outcome` names the error
/// kind when the call failed
pub const TOOL_CALLS_TOTAL: &str = "tool_calls_total";
/// Per-call latency histogram with `tool`, `context` attributes
pub const TOOL_LATENCY_SECONDS: &str = "tool_latency_seconds";
/// Discovery refreshes that actually enumerated the server
pub const DISCOVERY_REFRESH_TOTAL: &str = "discovery_refresh_total";
/// Access reviews issued (cache misses)
pub const ACCESS_REVIEWS_TOTAL: &str = "access_reviews_total";
