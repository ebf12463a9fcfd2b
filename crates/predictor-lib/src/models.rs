//! Core data models for the power output predictor

use crate::calibration::{CalibrationReport, PlausibleBand, ScalingKind};
use crate::error::PredictorError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Number of input features expected by every model
pub const FEATURE_COUNT: usize = 4;

/// Canonical plant sensor features, in model input order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureName {
    Temperature,
    AmbientPressure,
    RelativeHumidity,
    ExhaustVacuum,
}

impl FeatureName {
    pub const ALL: [FeatureName; FEATURE_COUNT] = [
        FeatureName::Temperature,
        FeatureName::AmbientPressure,
        FeatureName::RelativeHumidity,
        FeatureName::ExhaustVacuum,
    ];

    /// Display name used in model info and importance maps
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureName::Temperature => "Temperature",
            FeatureName::AmbientPressure => "AmbientPressure",
            FeatureName::RelativeHumidity => "RelativeHumidity",
            FeatureName::ExhaustVacuum => "ExhaustVacuum",
        }
    }

    /// Request field name for this feature
    pub fn field(&self) -> &'static str {
        match self {
            FeatureName::Temperature => "temperature",
            FeatureName::AmbientPressure => "ambient_pressure",
            FeatureName::RelativeHumidity => "relative_humidity",
            FeatureName::ExhaustVacuum => "exhaust_vacuum",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            FeatureName::Temperature => "°C",
            FeatureName::AmbientPressure => "mbar",
            FeatureName::RelativeHumidity => "%",
            FeatureName::ExhaustVacuum => "cm Hg",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            FeatureName::Temperature => 0,
            FeatureName::AmbientPressure => 1,
            FeatureName::RelativeHumidity => 2,
            FeatureName::ExhaustVacuum => 3,
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(FeatureName::as_str).collect()
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated sensor readings in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub temperature: f64,
    pub ambient_pressure: f64,
    pub relative_humidity: f64,
    pub exhaust_vacuum: f64,
}

impl FeatureVector {
    pub fn new(
        temperature: f64,
        ambient_pressure: f64,
        relative_humidity: f64,
        exhaust_vacuum: f64,
    ) -> Self {
        Self {
            temperature,
            ambient_pressure,
            relative_humidity,
            exhaust_vacuum,
        }
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.temperature,
            self.ambient_pressure,
            self.relative_humidity,
            self.exhaust_vacuum,
        ]
    }

    pub fn get(&self, feature: FeatureName) -> f64 {
        self.to_array()[feature.index()]
    }
}

/// Unvalidated request record; any JSON value is accepted per field and
/// coerced by the inference engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    #[serde(default)]
    pub temperature: Value,
    #[serde(default)]
    pub ambient_pressure: Value,
    #[serde(default)]
    pub relative_humidity: Value,
    #[serde(default)]
    pub exhaust_vacuum: Value,
}

impl InputRecord {
    pub fn new(
        temperature: impl Into<Value>,
        ambient_pressure: impl Into<Value>,
        relative_humidity: impl Into<Value>,
        exhaust_vacuum: impl Into<Value>,
    ) -> Self {
        Self {
            temperature: temperature.into(),
            ambient_pressure: ambient_pressure.into(),
            relative_humidity: relative_humidity.into(),
            exhaust_vacuum: exhaust_vacuum.into(),
        }
    }

    pub fn get(&self, feature: FeatureName) -> &Value {
        match feature {
            FeatureName::Temperature => &self.temperature,
            FeatureName::AmbientPressure => &self.ambient_pressure,
            FeatureName::RelativeHumidity => &self.relative_humidity,
            FeatureName::ExhaustVacuum => &self.exhaust_vacuum,
        }
    }
}

impl From<FeatureVector> for InputRecord {
    fn from(features: FeatureVector) -> Self {
        Self::new(
            features.temperature,
            features.ambient_pressure,
            features.relative_humidity,
            features.exhaust_vacuum,
        )
    }
}

/// Per-feature importance weights in canonical order
///
/// Serializes as a JSON object whose keys follow the canonical feature order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureImportance(Vec<(FeatureName, f64)>);

impl FeatureImportance {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Zip weights against the canonical feature names, clamping to [0, 1]
    pub fn from_weights(weights: &[f64]) -> Self {
        Self(
            FeatureName::ALL
                .iter()
                .zip(weights)
                .map(|(name, weight)| (*name, weight.clamp(0.0, 1.0)))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, feature: FeatureName) -> Option<f64> {
        self.0
            .iter()
            .find(|(name, _)| *name == feature)
            .map(|(_, weight)| *weight)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(FeatureName, f64)> {
        self.0.iter()
    }
}

impl Serialize for FeatureImportance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, weight) in &self.0 {
            map.serialize_entry(name.as_str(), weight)?;
        }
        map.end()
    }
}

/// Output of a single inference call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Predicted net electrical output in MW, rounded to 2 decimals
    pub predicted_power: f64,
    pub input_values: FeatureVector,
    pub feature_importance: FeatureImportance,
    /// Advisory flag: prediction fell outside the plausible output band
    pub out_of_range: bool,
    pub scaling: ScalingKind,
}

/// Error descriptor for one record of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemError {
    pub index: usize,
    pub error: String,
    pub kind: &'static str,
}

impl BatchItemError {
    pub fn new(index: usize, err: &PredictorError) -> Self {
        Self {
            index,
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

/// Per-record batch outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchOutcome {
    Prediction(PredictionResult),
    Failed(BatchItemError),
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, BatchOutcome::Prediction(_))
    }

    pub fn prediction(&self) -> Option<&PredictionResult> {
        match self {
            BatchOutcome::Prediction(result) => Some(result),
            BatchOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&BatchItemError> {
        match self {
            BatchOutcome::Prediction(_) => None,
            BatchOutcome::Failed(err) => Some(err),
        }
    }
}

/// Documented physical range of an input feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputRange {
    pub feature: &'static str,
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
}

/// Introspection record for a loaded artifact
#[derive(Debug, Clone, Serialize)]
pub struct LoadedModelInfo {
    pub model_type: String,
    pub format: String,
    pub path: String,
    pub checksum: String,
    pub size_bytes: u64,
    pub loaded_at: i64,
    pub feature_names: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_estimators: Option<usize>,
    #[serde(skip_serializing_if = "FeatureImportance::is_empty")]
    pub feature_importance: FeatureImportance,
    pub calibrated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_error: Option<String>,
    pub input_ranges: Vec<InputRange>,
    pub plausible_band: PlausibleBand,
}

/// Result of `get_model_info`; never an error
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelInfo {
    NotLoaded {
        message: String,
        feature_names: Vec<&'static str>,
    },
    Loaded(Box<LoadedModelInfo>),
}

impl ModelInfo {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelInfo::Loaded(_))
    }

    pub fn is_calibrated(&self) -> bool {
        match self {
            ModelInfo::Loaded(info) => info.calibrated,
            ModelInfo::NotLoaded { .. } => false,
        }
    }

    pub fn feature_names(&self) -> &[&'static str] {
        match self {
            ModelInfo::Loaded(info) => &info.feature_names,
            ModelInfo::NotLoaded { feature_names, .. } => feature_names,
        }
    }

    pub fn loaded(&self) -> Option<&LoadedModelInfo> {
        match self {
            ModelInfo::Loaded(info) => Some(info),
            ModelInfo::NotLoaded { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_order_is_canonical() {
        assert_eq!(
            FeatureName::names(),
            vec![
                "Temperature",
                "AmbientPressure",
                "RelativeHumidity",
                "ExhaustVacuum"
            ]
        );
        for (i, name) in FeatureName::ALL.iter().enumerate() {
            assert_eq!(name.index(), i);
        }
    }

    #[test]
    fn test_importance_serializes_in_canonical_order() {
        let importance = FeatureImportance::from_weights(&[0.9, 0.01, 0.03, 0.06]);
        let json = serde_json::to_string(&importance).unwrap();
        assert_eq!(
            json,
            r#"{"Temperature":0.9,"AmbientPressure":0.01,"RelativeHumidity":0.03,"ExhaustVacuum":0.06}"#
        );
    }

    #[test]
    fn test_importance_weights_clamped() {
        let importance = FeatureImportance::from_weights(&[1.5, -0.2, 0.3, 0.4]);
        assert_eq!(importance.get(FeatureName::Temperature), Some(1.0));
        assert_eq!(importance.get(FeatureName::AmbientPressure), Some(0.0));
    }

    #[test]
    fn test_empty_importance_serializes_as_empty_object() {
        let json = serde_json::to_string(&FeatureImportance::empty()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_input_record_missing_fields_default_to_null() {
        let record: InputRecord = serde_json::from_str(r#"{"temperature": 20.5}"#).unwrap();
        assert_eq!(record.temperature, Value::from(20.5));
        assert!(record.exhaust_vacuum.is_null());
    }

    #[test]
    fn test_not_loaded_info_serialization() {
        let info = ModelInfo::NotLoaded {
            message: "missing".to_string(),
            feature_names: FeatureName::names(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "not_loaded");
        assert_eq!(json["feature_names"][3], "ExhaustVacuum");
    }
}
