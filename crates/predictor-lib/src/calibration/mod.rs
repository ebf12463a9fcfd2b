//! Scaling detection
//!
//! Artifacts do not record whether the regressor was trained on raw physical
//! units or on standardized (z-scored) inputs. The detector decides at load
//! time by running a fixed panel of representative readings through the model
//! under both hypotheses and comparing the outputs against the plausible
//! output band and against each other's variance.
//!
//! Decision order:
//! 1. raw outputs all in band with non-trivial variance -> raw
//! 2. standardized outputs all in band with non-trivial variance -> standardized
//! 3. the path with the larger standard deviation
//! 4. standardized

use crate::artifact::ModelArtifact;
use crate::models::{FeatureName, InputRange, FEATURE_COUNT};
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// Reference statistics and physical range of one input feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureReference {
    pub mean: f64,
    pub scale: f64,
    pub min: f64,
    pub max: f64,
}

/// Known valid range of the predicted output (MW)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlausibleBand {
    pub min: f64,
    pub max: f64,
}

impl PlausibleBand {
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// Reference calibration profile: training-distribution standardization
/// constants, physical input ranges and the plausible output band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceProfile {
    /// Per-feature constants in canonical feature order
    pub features: [FeatureReference; FEATURE_COUNT],
    pub band: PlausibleBand,
    /// Minimum standard deviation (MW) for a path to count as using its input
    pub min_std: f64,
    /// Position of each panel sample inside every feature's range (0..=1)
    pub panel_fractions: Vec<f64>,
}

impl Default for ReferenceProfile {
    /// Combined-cycle power plant dataset: AT, AP, RH, V -> PE
    fn default() -> Self {
        Self {
            features: [
                FeatureReference {
                    mean: 19.6512,
                    scale: 7.4525,
                    min: 1.81,
                    max: 37.11,
                },
                FeatureReference {
                    mean: 1013.2591,
                    scale: 5.9388,
                    min: 992.89,
                    max: 1033.30,
                },
                FeatureReference {
                    mean: 73.3090,
                    scale: 14.6003,
                    min: 25.56,
                    max: 100.16,
                },
                FeatureReference {
                    mean: 54.3058,
                    scale: 12.7073,
                    min: 25.36,
                    max: 81.56,
                },
            ],
            band: PlausibleBand {
                min: 420.0,
                max: 500.0,
            },
            min_std: 1.0,
            panel_fractions: vec![0.35, 0.425, 0.5, 0.575, 0.65],
        }
    }
}

impl ReferenceProfile {
    pub fn means(&self) -> [f64; FEATURE_COUNT] {
        self.features.map(|f| f.mean)
    }

    pub fn scales(&self) -> [f64; FEATURE_COUNT] {
        self.features.map(|f| f.scale)
    }

    pub fn standardized_policy(&self) -> ScalingPolicy {
        ScalingPolicy::Standardized {
            mean: self.means(),
            scale: self.scales(),
        }
    }

    /// Representative samples around the middle of every feature's range
    pub fn panel(&self) -> Vec<[f64; FEATURE_COUNT]> {
        self.panel_fractions
            .iter()
            .map(|fraction| {
                self.features
                    .map(|f| f.min + (f.max - f.min) * fraction)
            })
            .collect()
    }

    pub fn input_ranges(&self) -> Vec<InputRange> {
        FeatureName::ALL
            .iter()
            .zip(&self.features)
            .map(|(name, reference)| InputRange {
                feature: name.as_str(),
                min: reference.min,
                max: reference.max,
                unit: name.unit(),
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, reference) in FeatureName::ALL.iter().zip(&self.features) {
            ensure!(
                reference.scale.is_finite() && reference.scale > 0.0,
                "{} scale must be positive",
                name
            );
            ensure!(
                reference.mean.is_finite() && reference.min < reference.max,
                "{} reference range is invalid",
                name
            );
        }
        ensure!(
            self.band.min < self.band.max,
            "plausible band is empty ({} - {})",
            self.band.min,
            self.band.max
        );
        ensure!(
            self.panel_fractions.len() >= 3,
            "calibration panel needs at least 3 samples, got {}",
            self.panel_fractions.len()
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingKind {
    Raw,
    Standardized,
}

impl ScalingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalingKind::Raw => "raw",
            ScalingKind::Standardized => "standardized",
        }
    }
}

/// How inputs are transformed before reaching the model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScalingPolicy {
    Raw,
    Standardized {
        mean: [f64; FEATURE_COUNT],
        scale: [f64; FEATURE_COUNT],
    },
}

impl ScalingPolicy {
    pub fn apply(&self, features: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        match self {
            ScalingPolicy::Raw => *features,
            ScalingPolicy::Standardized { mean, scale } => {
                let mut scaled = [0.0; FEATURE_COUNT];
                for i in 0..FEATURE_COUNT {
                    scaled[i] = (features[i] - mean[i]) / scale[i];
                }
                scaled
            }
        }
    }

    pub fn kind(&self) -> ScalingKind {
        match self {
            ScalingPolicy::Raw => ScalingKind::Raw,
            ScalingPolicy::Standardized { .. } => ScalingKind::Standardized,
        }
    }
}

/// Which step of the decision order selected the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    RawInBand,
    StandardizedInBand,
    RawHigherVariance,
    StandardizedHigherVariance,
    DegenerateDefault,
}

/// Panel statistics of one scaling hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathStats {
    pub mean: f64,
    pub std: f64,
    pub all_in_band: bool,
}

impl PathStats {
    fn from_predictions(predictions: &[f64], band: &PlausibleBand) -> Self {
        let n = predictions.len() as f64;
        let mean = predictions.iter().sum::<f64>() / n;
        let variance = predictions.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;

        Self {
            mean,
            std: variance.sqrt(),
            all_in_band: predictions.iter().all(|p| band.contains(*p)),
        }
    }

    fn is_informative(&self, min_std: f64) -> bool {
        self.all_in_band && self.std > min_std
    }
}

/// Outcome of calibrating one artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub policy: ScalingPolicy,
    pub rule: DecisionRule,
    pub raw: PathStats,
    pub standardized: PathStats,
    pub panel_size: usize,
}

fn decide(raw: &PathStats, standardized: &PathStats, min_std: f64) -> DecisionRule {
    if raw.is_informative(min_std) {
        return DecisionRule::RawInBand;
    }
    if standardized.is_informative(min_std) {
        return DecisionRule::StandardizedInBand;
    }

    match (raw.std.is_finite(), standardized.std.is_finite()) {
        (true, false) => DecisionRule::RawHigherVariance,
        (false, true) => DecisionRule::StandardizedHigherVariance,
        (true, true) if raw.std > standardized.std => DecisionRule::RawHigherVariance,
        (true, true) if standardized.std > raw.std => DecisionRule::StandardizedHigherVariance,
        _ => DecisionRule::DegenerateDefault,
    }
}

/// Decides the scaling policy for a loaded model
#[derive(Debug, Clone, Default)]
pub struct ScalingDetector {
    profile: ReferenceProfile,
}

impl ScalingDetector {
    pub fn new(profile: ReferenceProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &ReferenceProfile {
        &self.profile
    }

    /// Run the panel under both hypotheses and pick a policy
    ///
    /// Fails when the model cannot evaluate a panel sample.
    pub fn calibrate(&self, model: &dyn ModelArtifact) -> Result<CalibrationReport> {
        self.profile.validate()?;

        let standardized_policy = self.profile.standardized_policy();
        let panel = self.profile.panel();

        let mut raw_predictions = Vec::with_capacity(panel.len());
        let mut scaled_predictions = Vec::with_capacity(panel.len());
        for (idx, sample) in panel.iter().enumerate() {
            raw_predictions.push(
                model
                    .predict(sample)
                    .with_context(|| format!("raw panel sample {} failed", idx))?,
            );
            scaled_predictions.push(
                model
                    .predict(&standardized_policy.apply(sample))
                    .with_context(|| format!("standardized panel sample {} failed", idx))?,
            );
        }

        let raw = PathStats::from_predictions(&raw_predictions, &self.profile.band);
        let standardized = PathStats::from_predictions(&scaled_predictions, &self.profile.band);
        let rule = decide(&raw, &standardized, self.profile.min_std);

        let policy = match rule {
            DecisionRule::RawInBand | DecisionRule::RawHigherVariance => ScalingPolicy::Raw,
            DecisionRule::StandardizedInBand
            | DecisionRule::StandardizedHigherVariance
            | DecisionRule::DegenerateDefault => standardized_policy,
        };

        Ok(CalibrationReport {
            policy,
            rule,
            raw,
            standardized,
            panel_size: panel.len(),
        })
    }
}
