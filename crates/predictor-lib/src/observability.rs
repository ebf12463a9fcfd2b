//! Observability infrastructure for the power output predictor
//!
//! Provides:
//! - Prometheus metrics (inference latency, prediction counts, batch sizes, loaded model)
//! - Structured JSON logging with tracing

use crate::calibration::CalibrationReport;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

const BATCH_SIZE_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PredictorMetricsInner> = OnceLock::new();

struct PredictorMetricsInner {
    inference_latency_seconds: Histogram,
    predictions_total: IntCounter,
    prediction_errors_total: IntCounterVec,
    out_of_range_total: IntCounter,
    batch_size: Histogram,
    model_loaded: IntGauge,
    model_info: GaugeVec,
}

impl PredictorMetricsInner {
    fn new() -> Self {
        Self {
            inference_latency_seconds: register_histogram!(
                "power_predictor_inference_latency_seconds",
                "Time spent evaluating the model for a single prediction",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            predictions_total: register_int_counter!(
                "power_predictor_predictions_total",
                "Total number of successful predictions"
            )
            .expect("Failed to register predictions_total"),

            prediction_errors_total: register_int_counter_vec!(
                "power_predictor_prediction_errors_total",
                "Total number of failed predictions by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            out_of_range_total: register_int_counter!(
                "power_predictor_out_of_range_total",
                "Predictions that fell outside the plausible output band"
            )
            .expect("Failed to register out_of_range_total"),

            batch_size: register_histogram!(
                "power_predictor_batch_size",
                "Number of records per batch request",
                BATCH_SIZE_BUCKETS.to_vec()
            )
            .expect("Failed to register batch_size"),

            model_loaded: register_int_gauge!(
                "power_predictor_model_loaded",
                "1 when a calibrated model is serving predictions"
            )
            .expect("Failed to register model_loaded"),

            model_info: register_gauge_vec!(
                "power_predictor_model_info",
                "Information about the currently loaded model",
                &["model_type", "format", "scaling"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Predictor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct PredictorMetrics {
    _private: (),
}

impl Default for PredictorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PredictorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PredictorMetricsInner {
        GLOBAL_METRICS.get_or_init(PredictorMetricsInner::new)
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self) {
        self.inner().predictions_total.inc();
    }

    pub fn inc_prediction_errors(&self, kind: &str) {
        self.inner()
            .prediction_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_out_of_range(&self) {
        self.inner().out_of_range_total.inc();
    }

    pub fn observe_batch_size(&self, records: usize) {
        self.inner().batch_size.observe(records as f64);
    }

    /// Publish the serving model, replacing any previous labels
    pub fn set_model_loaded(&self, model_type: &str, format: &str, scaling: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[model_type, format, scaling])
            .set(1.0);
        self.inner().model_loaded.set(1);
    }

    pub fn set_model_unloaded(&self) {
        self.inner().model_info.reset();
        self.inner().model_loaded.set(0);
    }
}

/// Structured logger for predictor events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log_startup(&self, version: &str, model_path: &str) {
        info!(
            event = "predictor_started",
            node = %self.node_name,
            version = %version,
            model_path = %model_path,
            "Power output predictor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "predictor_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Power output predictor shutting down"
        );
    }

    pub fn log_model_loaded(
        &self,
        path: &str,
        format: &str,
        model_type: &str,
        n_estimators: Option<usize>,
        checksum: &str,
    ) {
        info!(
            event = "model_loaded",
            node = %self.node_name,
            path = %path,
            format = %format,
            model_type = %model_type,
            n_estimators = ?n_estimators,
            checksum = %checksum,
            "Model artifact loaded"
        );
    }

    pub fn log_model_load_failed(&self, path: &str, kind: &str, error: &str) {
        warn!(
            event = "model_load_failed",
            node = %self.node_name,
            path = %path,
            kind = %kind,
            error = %error,
            "Model artifact could not be loaded, predictions unavailable"
        );
    }

    pub fn log_calibration(&self, report: &CalibrationReport) {
        info!(
            event = "calibration_completed",
            node = %self.node_name,
            scaling = ?report.policy.kind(),
            rule = ?report.rule,
            raw_mean = report.raw.mean,
            raw_std = report.raw.std,
            raw_in_band = report.raw.all_in_band,
            standardized_mean = report.standardized.mean,
            standardized_std = report.standardized.std,
            standardized_in_band = report.standardized.all_in_band,
            panel_size = report.panel_size,
            "Input scaling resolved"
        );
    }

    pub fn log_calibration_failed(&self, model_type: &str, error: &str) {
        warn!(
            event = "calibration_failed",
            node = %self.node_name,
            model_type = %model_type,
            error = %error,
            "Model could not be calibrated, predictions unavailable"
        );
    }

    pub fn log_prediction(&self, predicted_power: f64, scaling: &str, elapsed_us: u128) {
        debug!(
            event = "prediction_generated",
            node = %self.node_name,
            predicted_power = predicted_power,
            scaling = %scaling,
            elapsed_us = elapsed_us,
            "Generated power output prediction"
        );
    }

    pub fn log_out_of_range(&self, predicted_power: f64, band_min: f64, band_max: f64) {
        warn!(
            event = "prediction_out_of_range",
            node = %self.node_name,
            predicted_power = predicted_power,
            band_min = band_min,
            band_max = band_max,
            "Prediction outside plausible output band"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predictor_metrics_creation() {
        let metrics = PredictorMetrics::new();

        metrics.observe_inference_latency(0.0004);
        metrics.inc_predictions();
        metrics.inc_prediction_errors("invalid_input");
        metrics.inc_out_of_range();
        metrics.observe_batch_size(3);
        metrics.set_model_loaded("RandomForestRegressor", "tree-ensemble-json", "raw");
        metrics.set_model_unloaded();
    }

    #[test]
    fn test_metrics_handles_share_registry() {
        let first = PredictorMetrics::new();
        let second = first.clone();
        first.inc_predictions();
        second.inc_predictions();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "power_predictor_predictions_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("plant-a");
        assert_eq!(logger.node_name(), "plant-a");
    }
}
