//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ReviewLens metrics
pub const METRICS_PREFIX: &str = "reviewlens";

/// SLO-aligned histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s - P50 target
    2.500,  // 2.5s
    5.000,  // 5s - P99 target
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Pipeline metrics
    describe_counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Questions answered, by path and outcome"
    );

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Pipeline stage latency in seconds"
    );

    describe_counter!(
        format!("{}_query_results_total", METRICS_PREFIX),
        Unit::Count,
        "Compiled query executions, by status"
    );

    describe_gauge!(
        format!("{}_evidence_hits", METRICS_PREFIX),
        Unit::Count,
        "Evidence hits returned by the last retrieval"
    );

    describe_counter!(
        format!("{}_generation_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Text generation calls that failed or timed out"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a finished question
pub fn record_question(path: &str, outcome: &str) {
    counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        "path" => path.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one pipeline stage
pub fn record_stage(stage: &str, duration_secs: f64) {
    histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        "stage" => stage.to_string()
    )
    .record(duration_secs);
}

/// Record one compiled query execution
pub fn record_query(source_table: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_query_results_total", METRICS_PREFIX),
        "table" => source_table.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record evidence retrieval size
pub fn record_retrieval(mode: &str, hits: usize) {
    gauge!(
        format!("{}_evidence_hits", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .set(hits as f64);
}

/// Record a failed generation call
pub fn record_generation_failure(backend: &str) {
    counter!(
        format!("{}_generation_failures_total", METRICS_PREFIX),
        "backend" => backend.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops
        let metrics = RequestMetrics::start("POST", "/v2/ask");
        metrics.finish(200);
        record_question("analytic", "done");
        record_stage("execute", 0.01);
        record_query("reviews", true);
        record_retrieval("trend", 12);
        record_generation_failure("disabled");
    }
}
