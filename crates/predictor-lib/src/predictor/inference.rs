//! Single-record inference
//!
//! Coerces the four readings, applies the calibrated scaling policy, runs the
//! model and rounds to two decimals. Out-of-band outputs are flagged, never
//! rejected.

use super::{Predictor, ReadyModel};
use crate::error::{PredictorError, Result};
use crate::models::{FeatureName, FeatureVector, InputRecord, PredictionResult, FEATURE_COUNT};
use serde_json::Value;
use std::time::Instant;

impl Predictor {
    /// Predict net electrical output from the four ambient readings
    ///
    /// Each argument may be a number or a numeric string.
    pub fn predict(
        &self,
        temperature: impl Into<Value>,
        ambient_pressure: impl Into<Value>,
        relative_humidity: impl Into<Value>,
        exhaust_vacuum: impl Into<Value>,
    ) -> Result<PredictionResult> {
        self.predict_record(&InputRecord::new(
            temperature,
            ambient_pressure,
            relative_humidity,
            exhaust_vacuum,
        ))
    }

    pub fn predict_vector(&self, features: FeatureVector) -> Result<PredictionResult> {
        self.predict_record(&InputRecord::from(features))
    }

    pub fn predict_record(&self, record: &InputRecord) -> Result<PredictionResult> {
        let result = self
            .ready()
            .and_then(|model| self.evaluate(&model, record));

        if let Err(e) = &result {
            self.metrics().inc_prediction_errors(e.kind());
        }
        result
    }

    /// Evaluate one record against an already acquired snapshot
    pub(crate) fn evaluate(&self, model: &ReadyModel, record: &InputRecord) -> Result<PredictionResult> {
        let features = coerce_record(record)?;
        let start = Instant::now();

        let model_input = model.report.policy.apply(&features.to_array());
        let raw = model
            .artifact
            .model
            .predict(&model_input)
            .map_err(|e| PredictorError::inference_unavailable(&e))?;

        if !raw.is_finite() {
            return Err(PredictorError::InferenceUnavailable {
                reason: format!("model returned a non-finite output ({})", raw),
            });
        }

        let elapsed = start.elapsed();
        let predicted_power = round_to_cents(raw);
        let scaling = model.report.policy.kind();

        let out_of_range = !model.band.contains(predicted_power);
        if out_of_range {
            self.metrics().inc_out_of_range();
            self.logger()
                .log_out_of_range(predicted_power, model.band.min, model.band.max);
        }

        self.metrics().observe_inference_latency(elapsed.as_secs_f64());
        self.metrics().inc_predictions();
        self.logger()
            .log_prediction(predicted_power, scaling.as_str(), elapsed.as_micros());

        Ok(PredictionResult {
            predicted_power,
            input_values: features,
            feature_importance: model.importance.clone(),
            out_of_range,
            scaling,
        })
    }
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Convert one request value into a finite float
///
/// Accepts JSON numbers and strings that parse as a float after trimming.
pub fn coerce_field(feature: FeatureName, value: &Value) -> Result<f64> {
    let invalid = |reason: String| PredictorError::InvalidInput {
        field: feature.field(),
        reason,
    };

    let parsed = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| invalid(format!("{} is not representable as a float", n)))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("'{}' is not a number", s)))?,
        Value::Null => return Err(invalid("value is missing".to_string())),
        Value::Bool(_) => return Err(invalid("expected a number, got a boolean".to_string())),
        Value::Array(_) => return Err(invalid("expected a number, got an array".to_string())),
        Value::Object(_) => return Err(invalid("expected a number, got an object".to_string())),
    };

    if !parsed.is_finite() {
        return Err(invalid(format!("{} is not a finite reading", parsed)));
    }
    Ok(parsed)
}

fn coerce_record(record: &InputRecord) -> Result<FeatureVector> {
    let mut values = [0.0; FEATURE_COUNT];
    for feature in FeatureName::ALL {
        values[feature.index()] = coerce_field(feature, record.get(feature))?;
    }
    Ok(FeatureVector::from_array(values))
}
