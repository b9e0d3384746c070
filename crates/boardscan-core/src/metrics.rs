//! Metrics collection and reporting
//!
//! Counters are kept in-process for `snapshot()` and mirrored to the
//! `metrics` facade so an installed recorder sees the same events.

use crate::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics collector for inspection runs
#[derive(Clone)]
pub struct InspectionMetrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    predictions: AtomicU64,
    model_loads: AtomicU64,
    model_unavailable: AtomicU64,
    image_decode_failures: AtomicU64,
    inference_failures: AtomicU64,
    other_failures: AtomicU64,
    total_latency_us: AtomicU64,
    model_load_latency_us: AtomicU64,
}

impl InspectionMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                predictions: AtomicU64::new(0),
                model_loads: AtomicU64::new(0),
                model_unavailable: AtomicU64::new(0),
                image_decode_failures: AtomicU64::new(0),
                inference_failures: AtomicU64::new(0),
                other_failures: AtomicU64::new(0),
                total_latency_us: AtomicU64::new(0),
                model_load_latency_us: AtomicU64::new(0),
            }),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, latency_us: u64) {
        self.inner.predictions.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);

        metrics::counter!("boardscan_predictions_total").increment(1);
        metrics::histogram!("boardscan_prediction_latency_us").record(latency_us as f64);
    }

    /// Record a failed prediction
    pub fn record_failure(&self, error: &Error) {
        let counter = match error {
            Error::ModelUnavailable(_) => &self.inner.model_unavailable,
            Error::ImageDecode(_) => &self.inner.image_decode_failures,
            Error::Inference(_) => &self.inner.inference_failures,
            _ => &self.inner.other_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        metrics::counter!("boardscan_errors_total", "kind" => error.kind()).increment(1);
    }

    /// Record a completed model load
    pub fn record_model_load(&self, latency_us: u64) {
        self.inner.model_loads.fetch_add(1, Ordering::Relaxed);
        self.inner
            .model_load_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);

        metrics::counter!("boardscan_model_loads_total").increment(1);
        metrics::histogram!("boardscan_model_load_latency_us").record(latency_us as f64);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            predictions: self.inner.predictions.load(Ordering::Relaxed),
            model_loads: self.inner.model_loads.load(Ordering::Relaxed),
            model_unavailable: self.inner.model_unavailable.load(Ordering::Relaxed),
            image_decode_failures: self.inner.image_decode_failures.load(Ordering::Relaxed),
            inference_failures: self.inner.inference_failures.load(Ordering::Relaxed),
            other_failures: self.inner.other_failures.load(Ordering::Relaxed),
            total_latency_us: self.inner.total_latency_us.load(Ordering::Relaxed),
            model_load_latency_us: self.inner.model_load_latency_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for InspectionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub predictions: u64,
    pub model_loads: u64,
    pub model_unavailable: u64,
    pub image_decode_failures: u64,
    pub inference_failures: u64,
    pub other_failures: u64,
    pub total_latency_us: u64,
    pub model_load_latency_us: u64,
}

impl MetricsSnapshot {
    /// Total failed predictions of any kind
    pub fn failures(&self) -> u64 {
        self.model_unavailable
            + self.image_decode_failures
            + self.inference_failures
            + self.other_failures
    }

    /// Average latency of successful predictions
    pub fn avg_latency_us(&self) -> u64 {
        if self.predictions == 0 {
            0
        } else {
            self.total_latency_us / self.predictions
        }
    }

    /// Fraction of attempted predictions that failed
    pub fn failure_rate(&self) -> f64 {
        let attempts = self.predictions + self.failures();
        if attempts == 0 {
            0.0
        } else {
            self.failures() as f64 / attempts as f64
        }
    }
}
