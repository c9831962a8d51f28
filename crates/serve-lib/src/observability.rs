//! Observability infrastructure for the inference service
//!
//! Provides:
//! - Prometheus metrics (predictions, errors, latency, accuracy, in-flight requests)
//! - Structured JSON logging with tracing

use anyhow::{Context, Result};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Failure categories counted by `ml_errors_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    PredictionError,
    BatchError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::PredictionError => "prediction_error",
            ErrorKind::BatchError => "batch_error",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

/// Prometheus collectors registered in the handle's own registry
struct MetricsInner {
    registry: Registry,
    predictions_total: IntCounterVec,
    prediction_duration_seconds: Histogram,
    model_accuracy: Gauge,
    active_requests: IntGauge,
    errors_total: IntCounterVec,
}

impl MetricsInner {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let predictions_total = IntCounterVec::new(
            Opts::new("ml_predictions_total", "Total number of predictions"),
            &["model", "class"],
        )?;
        let prediction_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "ml_prediction_duration_seconds",
                "Time spent processing prediction",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let model_accuracy = Gauge::new("ml_model_accuracy", "Model accuracy score")?;
        let active_requests = IntGauge::new("ml_active_requests", "Number of active requests")?;
        let errors_total = IntCounterVec::new(
            Opts::new("ml_errors_total", "Total number of errors"),
            &["type"],
        )?;

        registry.register(Box::new(predictions_total.clone()))?;
        registry.register(Box::new(prediction_duration_seconds.clone()))?;
        registry.register(Box::new(model_accuracy.clone()))?;
        registry.register(Box::new(active_requests.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self {
            registry,
            predictions_total,
            prediction_duration_seconds,
            model_accuracy,
            active_requests,
            errors_total,
        })
    }
}

/// Serving metrics for Prometheus exposition
///
/// Each handle owns its registry; clones share the same collectors. Every
/// operation is an atomic update, so handlers may call them concurrently.
#[derive(Clone)]
pub struct ServingMetrics {
    inner: Arc<MetricsInner>,
}

impl ServingMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            inner: Arc::new(MetricsInner::new()?),
        })
    }

    /// Count a served prediction
    pub fn record_prediction(&self, model: &str, class: &str) {
        self.inner
            .predictions_total
            .with_label_values(&[model, class])
            .inc();
    }

    /// Record a prediction latency observation
    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner.prediction_duration_seconds.observe(duration_secs);
    }

    /// Count a failure of the given category
    pub fn record_error(&self, kind: ErrorKind) {
        self.inner
            .errors_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Publish the loaded bundle's offline accuracy
    pub fn set_model_accuracy(&self, accuracy: f64) {
        self.inner.model_accuracy.set(accuracy);
    }

    /// Mark a request as in flight until the returned guard is dropped
    pub fn request_started(&self) -> InFlightGuard {
        self.inner.active_requests.inc();
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    /// Release one in-flight request; normally called by [`InFlightGuard`]
    pub fn request_finished(&self) {
        self.inner.active_requests.dec();
    }

    pub fn in_flight(&self) -> i64 {
        self.inner.active_requests.get()
    }

    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.inner
            .errors_total
            .with_label_values(&[kind.as_str()])
            .get()
    }

    pub fn prediction_count(&self, model: &str, class: &str) -> u64 {
        self.inner
            .predictions_total
            .with_label_values(&[model, class])
            .get()
    }

    pub fn latency_sample_count(&self) -> u64 {
        self.inner.prediction_duration_seconds.get_sample_count()
    }

    pub fn model_accuracy(&self) -> f64 {
        self.inner.model_accuracy.get()
    }

    /// Content type of [`ServingMetrics::encode`] output
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Render every collector in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
    }
}

/// Holds one in-flight request slot; releases it on drop, whatever the exit path
pub struct InFlightGuard {
    metrics: ServingMetrics,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.request_finished();
    }
}

/// Structured logger for service events
///
/// Provides consistent JSON-formatted logging for startup, model loading,
/// predictions and shutdown.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, addr: &str) {
        info!(
            event = "server_started",
            instance = %self.instance,
            version = %version,
            addr = %addr,
            "Model server started"
        );
    }

    /// Log a successfully loaded bundle
    pub fn log_model_loaded(&self, source: &str, model: &str, accuracy: f64, classes: &[String]) {
        info!(
            event = "model_loaded",
            instance = %self.instance,
            source = %source,
            model = %model,
            accuracy = accuracy,
            classes = ?classes,
            "Model bundle loaded"
        );
    }

    /// Log a served prediction
    pub fn log_prediction(&self, class: &str, confidence: f64, latency_ms: f64) {
        info!(
            event = "prediction_served",
            instance = %self.instance,
            class = %class,
            confidence = confidence,
            latency_ms = latency_ms,
            "Prediction: {} (confidence: {:.4})",
            class,
            confidence
        );
    }

    /// Log a failed readiness probe
    pub fn log_not_ready(&self, reason: &str) {
        warn!(
            event = "readiness_failed",
            instance = %self.instance,
            reason = %reason,
            "Readiness check failed"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Model server shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_independent() {
        let a = ServingMetrics::new().unwrap();
        let b = ServingMetrics::new().unwrap();

        a.record_error(ErrorKind::InvalidInput);
        assert_eq!(a.error_count(ErrorKind::InvalidInput), 1);
        assert_eq!(b.error_count(ErrorKind::InvalidInput), 0);
    }

    #[test]
    fn test_clones_share_collectors() {
        let metrics = ServingMetrics::new().unwrap();
        let clone = metrics.clone();

        clone.record_prediction("iris", "setosa");
        assert_eq!(metrics.prediction_count("iris", "setosa"), 1);
        assert_eq!(metrics.prediction_count("iris", "virginica"), 0);
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let metrics = ServingMetrics::new().unwrap();
        {
            let _first = metrics.request_started();
            let _second = metrics.request_started();
            assert_eq!(metrics.in_flight(), 2);
        }
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn test_in_flight_guard_releases_on_panic() {
        let metrics = ServingMetrics::new().unwrap();
        let inner = metrics.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.request_started();
            panic!("handler failure");
        }));

        assert!(result.is_err());
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let metrics = ServingMetrics::new().unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let metrics = metrics.clone();
                scope.spawn(move || {
                    for _ in 0..1000 {
                        let _guard = metrics.request_started();
                        metrics.record_prediction("iris", "setosa");
                        metrics.record_error(ErrorKind::BatchError);
                    }
                });
            }
        });

        assert_eq!(metrics.prediction_count("iris", "setosa"), 8000);
        assert_eq!(metrics.error_count(ErrorKind::BatchError), 8000);
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn test_encode_exposes_all_families() {
        let metrics = ServingMetrics::new().unwrap();
        metrics.set_model_accuracy(0.9667);
        metrics.record_prediction("iris", "setosa");
        metrics.observe_prediction_latency(0.002);
        metrics.record_error(ErrorKind::InternalError);

        let text = metrics.encode().unwrap();
        assert!(text.contains("ml_predictions_total{class=\"setosa\",model=\"iris\"} 1"));
        assert!(text.contains("ml_prediction_duration_seconds_bucket"));
        assert!(text.contains("ml_prediction_duration_seconds_count 1"));
        assert!(text.contains("ml_model_accuracy 0.9667"));
        assert!(text.contains("ml_active_requests 0"));
        assert!(text.contains("ml_errors_total{type=\"internal_error\"} 1"));
        assert!(metrics.content_type().starts_with("text/plain"));
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(ErrorKind::InvalidInput.as_str(), "invalid_input");
        assert_eq!(ErrorKind::PredictionError.as_str(), "prediction_error");
        assert_eq!(ErrorKind::BatchError.as_str(), "batch_error");
        assert_eq!(ErrorKind::InternalError.as_str(), "internal_error");
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance, "test-instance");
    }
}
