//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_histogram_with_registry, CounterVec, Histogram, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // HTTP API metrics
    pub http_requests: CounterVec,
    pub http_request_duration: HistogramVec,

    // Chat-completion metrics
    pub llm_calls: CounterVec,

    // Summarization pipeline metrics
    pub summarization_segments: Histogram,

    // Literature source metrics
    pub pubmed_requests: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let http_requests = register_counter_vec_with_registry!(
            Opts::new("http_requests_total", "Total API requests"),
            &["endpoint", "status"],
            registry
        )?;

        let http_request_duration = register_histogram_vec_with_registry!(
            "http_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            registry
        )?;

        let llm_calls = register_counter_vec_with_registry!(
            Opts::new("llm_calls_total", "Total chat-completion calls"),
            &["operation", "status"],
            registry
        )?;

        let summarization_segments = register_histogram_with_registry!(
            "summarization_segments",
            "Segments per chunked summarization",
            vec![2.0, 3.0, 5.0, 8.0, 13.0, 21.0],
            registry
        )?;

        let pubmed_requests = register_counter_vec_with_registry!(
            Opts::new("pubmed_requests_total", "Total NCBI requests"),
            &["operation", "status"],
            registry
        )?;

        Ok(Self {
            registry,
            http_requests,
            http_request_duration,
            llm_calls,
            summarization_segments,
            pubmed_requests,
        })
    }

    pub fn record_request(&self, endpoint: &str, success: bool) {
        let status = if success { "ok" } else { "error" };
        self.http_requests.with_label_values(&[endpoint, status]).inc();
    }

    pub fn observe_duration(&self, endpoint: &str, seconds: f64) {
        self.http_request_duration
            .with_label_values(&[endpoint])
            .observe(seconds);
    }

    pub fn record_llm_call(&self, operation: &str, success: bool) {
        let status = if success { "ok" } else { "error" };
        self.llm_calls.with_label_values(&[operation, status]).inc();
    }

    pub fn observe_segments(&self, count: f64) {
        self.summarization_segments.observe(count);
    }

    pub fn record_pubmed(&self, operation: &str, success: bool) {
        let status = if success { "ok" } else { "error" };
        self.pubmed_requests
            .with_label_values(&[operation, status])
            .inc();
    }

    /// Render the registry in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialize() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_and_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("search", true);
        metrics.record_llm_call("segment_summary", false);
        metrics.observe_segments(3.0);

        let rendered = metrics.render();
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("llm_calls_total"));
        assert!(rendered.contains("summarization_segments"));
    }
}
