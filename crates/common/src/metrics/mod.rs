//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with latency-bucketed histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::{Duration, Instant};

/// Metrics prefix for all NetRAG metrics
pub const METRICS_PREFIX: &str = "netrag";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s, generation can be slow
];

/// Buckets for embedding and generation backends
pub const BACKEND_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
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

    // Query pipeline metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total answered queries by provider and outcome"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end query latency in seconds"
    );

    describe_counter!(
        format!("{}_route_decisions_total", METRICS_PREFIX),
        Unit::Count,
        "Provider selections, labelled by provider and fallback"
    );

    // Retrieval metrics
    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Similarity search latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_hits", METRICS_PREFIX),
        Unit::Count,
        "Chunks above threshold in the last search"
    );

    // Indexing metrics
    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Chunks submitted for indexing, labelled new or duplicate"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Document ingestion latency in seconds"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Generation metrics
    describe_counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat completion requests"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chat completion latency in seconds"
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

/// Record a completed (or failed) query
pub fn record_query(provider: &str, fallback: bool, success: bool, elapsed: Duration) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "fallback" => fallback.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .record(elapsed.as_secs_f64());
}

/// Record which provider the router picked
pub fn record_route(provider: &str, via_fallback: bool) {
    counter!(
        format!("{}_route_decisions_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "fallback" => via_fallback.to_string()
    )
    .increment(1);
}

/// Record a similarity search
pub fn record_retrieval(elapsed: Duration, hits: usize) {
    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX))
        .record(elapsed.as_secs_f64());

    gauge!(format!("{}_retrieval_hits", METRICS_PREFIX)).set(hits as f64);
}

/// Record whether an indexed chunk was new or already stored
pub fn record_dedup(inserted: bool) {
    let outcome = if inserted { "new" } else { "duplicate" };

    counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a document ingestion
pub fn record_ingestion(elapsed: Duration) {
    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX))
        .record(elapsed.as_secs_f64());
}

/// Record a successful embedding batch
pub fn record_embedding(model: &str, batch_size: usize, elapsed: Duration) {
    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string(),
        "batch" => if batch_size > 1 { "batch" } else { "single" }
    )
    .record(elapsed.as_secs_f64());
}

/// Record a failed embedding call
pub fn record_embedding_error(model: &str) {
    counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .increment(1);
}

/// Record a chat completion call
pub fn record_generation(model: &str, success: bool, elapsed: Duration) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_generation_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_generation_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_sorted() {
        for buckets in [LATENCY_BUCKETS, BACKEND_BUCKETS] {
            assert!(buckets.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed; calls must be no-ops
        let metrics = RequestMetrics::start("POST", "/query");
        metrics.finish(200);
        record_query("KnowledgeBaseProvider", true, true, Duration::from_millis(5));
        record_route("NetworkProvider", false);
        record_retrieval(Duration::from_millis(1), 2);
        record_dedup(false);
        record_embedding("mock-embedding", 1, Duration::from_millis(1));
        record_generation("mock-llm", false, Duration::from_millis(1));
    }
}
