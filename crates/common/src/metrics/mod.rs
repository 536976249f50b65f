//! Metrics and observability utilities
//!
//! Thin helpers over the `metrics` facade with standardized naming. The
//! library never installs a recorder; without one every call is a no-op.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all LearnForge metrics
pub const METRICS_PREFIX: &str = "learnforge";

/// Register all metric descriptions
pub fn register_metrics() {
    // Retrieval metrics
    describe_counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        Unit::Count,
        "Total corpus retrievals per strategy"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Corpus retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of passages returned by the last retrieval"
    );

    describe_counter!(
        format!("{}_retrieval_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Retrievals that failed or timed out and degraded to empty"
    );

    // Packing metrics
    describe_histogram!(
        format!("{}_packed_tokens", METRICS_PREFIX),
        Unit::Count,
        "Tokens in the packed context"
    );

    describe_gauge!(
        format!("{}_packed_chunks", METRICS_PREFIX),
        Unit::Count,
        "Chunks in the last packed context"
    );

    describe_counter!(
        format!("{}_packing_truncations_total", METRICS_PREFIX),
        Unit::Count,
        "Packed contexts filled with a truncated passage"
    );

    // Aggregation metrics
    describe_counter!(
        format!("{}_aggregations_total", METRICS_PREFIX),
        Unit::Count,
        "Cross-subject aggregations"
    );

    // Synthesis metrics
    describe_counter!(
        format!("{}_completions_total", METRICS_PREFIX),
        Unit::Count,
        "Language model completion requests"
    );

    describe_histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model completion latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Times a single corpus retrieval
pub struct RetrievalTimer {
    start: Instant,
    strategy: &'static str,
}

impl RetrievalTimer {
    pub fn start(strategy: &'static str) -> Self {
        Self {
            start: Instant::now(),
            strategy,
        }
    }

    /// Record a successful retrieval
    pub fn finish(self, result_count: usize) {
        record_retrieval(self.start.elapsed().as_secs_f64(), self.strategy, result_count);
    }

    /// Record a degraded retrieval
    pub fn fail(self, reason: &str) {
        record_retrieval_failure(self.strategy, reason);
    }
}

/// Helper to record retrieval metrics
pub fn record_retrieval(duration_secs: f64, strategy: &str, result_count: usize) {
    counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record a retrieval that degraded to an empty result
pub fn record_retrieval_failure(strategy: &str, reason: &str) {
    counter!(
        format!("{}_retrieval_failures_total", METRICS_PREFIX),
        "strategy" => strategy.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Helper to record packing metrics
pub fn record_packing(total_tokens: usize, chunk_count: usize, truncated: bool) {
    histogram!(format!("{}_packed_tokens", METRICS_PREFIX)).record(total_tokens as f64);
    gauge!(format!("{}_packed_chunks", METRICS_PREFIX)).set(chunk_count as f64);

    if truncated {
        counter!(format!("{}_packing_truncations_total", METRICS_PREFIX)).increment(1);
    }
}

/// Helper to record an aggregation
pub fn record_aggregation(related_subjects: usize) {
    counter!(
        format!("{}_aggregations_total", METRICS_PREFIX),
        "with_related" => (related_subjects > 0).to_string()
    )
    .increment(1);
}

/// Helper to record language model metrics
pub fn record_completion(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_completions_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_completion_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}
