//! Prometheus metrics for the peer client.
//!
//! quill is a library crate, so there is no exporter here; the embedding
//! application serves [`ClientMetrics::registry`] however it likes.

use prometheus::{Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use quill_protocol::message::OperationType;
use std::time::Duration;

/// Operation latency histogram buckets (in seconds).
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

/// Prometheus metrics for a peer client.
#[derive(Clone)]
pub struct ClientMetrics {
    registry: Registry,
    /// Operation latency by operation and outcome.
    pub operation_latency: HistogramVec,
    /// Total requests issued by operation type.
    pub requests_total: CounterVec,
    /// Requests that expired before a response arrived, by operation type.
    pub timeouts_total: CounterVec,
    /// Successful connection attempts.
    pub connects_total: Counter,
    /// Failed connection attempts.
    pub connect_failures_total: Counter,
    /// Remote disconnects observed.
    pub disconnects_total: Counter,
}

impl ClientMetrics {
    /// Creates a new metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let operation_latency = HistogramVec::new(
            HistogramOpts::new(
                "quill_client_operation_latency_seconds",
                "Operation latency in seconds by operation and outcome",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operation_latency.clone()))?;

        let requests_total = CounterVec::new(
            Opts::new("quill_client_requests_total", "Total requests by operation"),
            &["operation"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let timeouts_total = CounterVec::new(
            Opts::new(
                "quill_client_request_timeouts_total",
                "Requests that expired before a response arrived",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(timeouts_total.clone()))?;

        let connects_total = Counter::with_opts(Opts::new(
            "quill_client_connects_total",
            "Successful connection attempts",
        ))?;
        registry.register(Box::new(connects_total.clone()))?;

        let connect_failures_total = Counter::with_opts(Opts::new(
            "quill_client_connect_failures_total",
            "Failed connection attempts",
        ))?;
        registry.register(Box::new(connect_failures_total.clone()))?;

        let disconnects_total = Counter::with_opts(Opts::new(
            "quill_client_disconnects_total",
            "Remote disconnects observed",
        ))?;
        registry.register(Box::new(disconnects_total.clone()))?;

        Ok(Self {
            registry,
            operation_latency,
            requests_total,
            timeouts_total,
            connects_total,
            connect_failures_total,
            disconnects_total,
        })
    }

    /// Records a successful completion of `op` with the given latency.
    pub fn register_successful_event(&self, op: OperationType, latency: Duration) {
        self.operation_latency
            .with_label_values(&[op.name(), "success"])
            .observe(latency.as_secs_f64());
    }

    /// Records a failed completion of `op` with the given latency.
    pub fn register_failed_event(&self, op: OperationType, latency: Duration) {
        self.operation_latency
            .with_label_values(&[op.name(), "failure"])
            .observe(latency.as_secs_f64());
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self::new().expect("failed to create default client metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Encoder as _;

    fn encode(metrics: &ClientMetrics) -> String {
        let mut buffer = Vec::new();
        let encoder = prometheus::TextEncoder::new();
        encoder
            .encode(&metrics.registry().gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = ClientMetrics::new().unwrap();

        metrics.connects_total.inc();
        metrics
            .requests_total
            .with_label_values(&["ADD_ENTRY"])
            .inc();
        metrics.register_successful_event(OperationType::AddEntry, Duration::from_millis(3));
        metrics.register_failed_event(OperationType::ReadEntry, Duration::from_millis(7));

        let encoded = encode(&metrics);
        assert!(encoded.contains("quill_client_connects_total"));
        assert!(encoded.contains("quill_client_requests_total"));
        assert!(encoded.contains("quill_client_operation_latency_seconds"));
    }

    #[test]
    fn test_metrics_default() {
        let metrics = ClientMetrics::default();
        assert!(!encode(&metrics).is_empty());
    }
}
