//! Prediction engine
//!
//! A [`Predictor`] owns the load -> calibrate pipeline and publishes its
//! outcome as one immutable snapshot behind an `Arc`. Inference clones the
//! snapshot and computes without holding any lock, so a concurrent reload can
//! never pair the old model with the new scaling policy.

mod batch;
mod inference;


pub use inference::coerce_field;

use crate::artifact::{
    resolve_artifact_path, ArtifactLoader, LoadedArtifact, ModelArtifact, DEFAULT_MODEL_FILE,
};
use crate::calibration::{
    CalibrationReport, DecisionRule, PlausibleBand, ReferenceProfile, ScalingDetector, ScalingKind,
};
use crate::error::{PredictorError, Result};
use crate::models::{FeatureImportance, FeatureName, LoadedModelInfo, ModelInfo, FEATURE_COUNT};
use crate::observability::{PredictorMetrics, StructuredLogger};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::warn;

/// Configuration for a [`Predictor`]
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    /// Artifact path, relative paths resolve against `base_dir`
    pub model_path: PathBuf,
    /// Base directory for relative paths; the executable's directory when unset
    pub base_dir: Option<PathBuf>,
    pub profile: ReferenceProfile,
    /// Name attached to structured log events
    pub node_name: String,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_FILE),
            base_dir: None,
            profile: ReferenceProfile::default(),
            node_name: "local".to_string(),
        }
    }
}

impl PredictorConfig {
    pub fn resolved_model_path(&self) -> PathBuf {
        resolve_artifact_path(&self.model_path, self.base_dir.as_deref())
    }
}

/// A loaded and calibrated model, ready to serve predictions
pub(crate) struct ReadyModel {
    pub(crate) artifact: LoadedArtifact,
    pub(crate) report: CalibrationReport,
    pub(crate) importance: FeatureImportance,
    pub(crate) band: PlausibleBand,
}

impl ReadyModel {
    fn summary(&self) -> LoadSummary {
        LoadSummary {
            model_type: self.artifact.model.model_type().to_string(),
            format: self.artifact.format,
            path: self.artifact.path.clone(),
            scaling: self.report.policy.kind(),
            rule: self.report.rule,
        }
    }
}

/// Published predictor state
pub(crate) enum ModelState {
    Unloaded,
    NotLoaded {
        error: PredictorError,
    },
    Uncalibrated {
        artifact: LoadedArtifact,
        error: PredictorError,
    },
    Ready(Arc<ReadyModel>),
}

impl ModelState {
    fn is_ready(&self) -> bool {
        matches!(self, ModelState::Ready(_))
    }

    fn not_ready_reason(&self) -> String {
        match self {
            ModelState::Unloaded => "model has not been loaded".to_string(),
            ModelState::NotLoaded { error } => format!("model failed to load: {}", error),
            ModelState::Uncalibrated { error, .. } => {
                format!("model is loaded but uncalibrated: {}", error)
            }
            ModelState::Ready(_) => String::new(),
        }
    }
}

/// Outcome of a successful load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    pub model_type: String,
    pub format: &'static str,
    pub path: PathBuf,
    pub scaling: ScalingKind,
    pub rule: DecisionRule,
}

/// Power output predictor, shared across threads via `Arc`
pub struct Predictor {
    config: PredictorConfig,
    loader: ArtifactLoader,
    detector: ScalingDetector,
    state: RwLock<Arc<ModelState>>,
    load_guard: Mutex<()>,
    metrics: PredictorMetrics,
    logger: StructuredLogger,
}

impl Predictor {
    /// Create an unloaded predictor with the default artifact formats
    pub fn new(config: PredictorConfig) -> Self {
        Self::with_loader(config, ArtifactLoader::new())
    }

    pub fn with_loader(config: PredictorConfig, loader: ArtifactLoader) -> Self {
        let detector = ScalingDetector::new(config.profile.clone());
        let logger = StructuredLogger::new(config.node_name.clone());
        Self {
            config,
            loader,
            detector,
            state: RwLock::new(Arc::new(ModelState::Unloaded)),
            load_guard: Mutex::new(()),
            metrics: PredictorMetrics::new(),
            logger,
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Load and calibrate the configured artifact
    ///
    /// Idempotent: once a model is ready, later calls return its summary
    /// without touching the filesystem. A failed load leaves the predictor
    /// in a "not loaded" or "uncalibrated" state that `get_model_info`
    /// reports and `predict` rejects.
    pub fn load(&self) -> Result<LoadSummary> {
        let _guard = self.load_guard.lock().unwrap_or_else(PoisonError::into_inner);

        if let ModelState::Ready(ready) = &*self.snapshot() {
            return Ok(ready.summary());
        }

        let (state, outcome) = self.run_pipeline();
        self.publish(state);
        outcome
    }

    /// Re-run the full pipeline against the configured path
    ///
    /// The new snapshot replaces a serving model only on success; a failed
    /// reload keeps the previous model.
    pub fn reload(&self) -> Result<LoadSummary> {
        let _guard = self.load_guard.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.snapshot();
        let (state, outcome) = self.run_pipeline();

        if outcome.is_ok() || !previous.is_ready() {
            self.publish(state);
        } else if let Err(e) = &outcome {
            warn!(
                path = %self.config.resolved_model_path().display(),
                error = %e,
                "Model reload failed, keeping previous model"
            );
        }
        outcome
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_ready()
    }

    /// Introspection record; never fails
    pub fn get_model_info(&self) -> ModelInfo {
        let snapshot = self.snapshot();
        match &*snapshot {
            ModelState::Unloaded | ModelState::NotLoaded { .. } => ModelInfo::NotLoaded {
                message: snapshot.not_ready_reason(),
                feature_names: FeatureName::names(),
            },
            ModelState::Uncalibrated { artifact, error } => {
                ModelInfo::Loaded(Box::new(self.describe(artifact, None, Some(error))))
            }
            ModelState::Ready(ready) => ModelInfo::Loaded(Box::new(self.describe(
                &ready.artifact,
                Some(&ready.report),
                None,
            ))),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<ModelState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current serving model, or `ModelNotReady`
    pub(crate) fn ready(&self) -> Result<Arc<ReadyModel>> {
        match &*self.snapshot() {
            ModelState::Ready(ready) => Ok(ready.clone()),
            other => Err(PredictorError::not_ready(other.not_ready_reason())),
        }
    }

    pub(crate) fn metrics(&self) -> &PredictorMetrics {
        &self.metrics
    }

    fn run_pipeline(&self) -> (ModelState, Result<LoadSummary>) {
        let path = self.config.resolved_model_path();

        let artifact = match self.loader.load(&path) {
            Ok(artifact) => artifact,
            Err(e) => {
                self.logger
                    .log_model_load_failed(&path.display().to_string(), e.kind(), &e.to_string());
                return (ModelState::NotLoaded { error: e.clone() }, Err(e));
            }
        };

        self.logger.log_model_loaded(
            &artifact.path.display().to_string(),
            artifact.format,
            artifact.model.model_type(),
            artifact.model.estimator_count(),
            &artifact.checksum,
        );

        let report = match self.detector.calibrate(artifact.model.as_ref()) {
            Ok(report) => report,
            Err(e) => {
                let error = PredictorError::inference_unavailable(&e);
                self.logger
                    .log_calibration_failed(artifact.model.model_type(), &error.to_string());
                return (
                    ModelState::Uncalibrated {
                        artifact,
                        error: error.clone(),
                    },
                    Err(error),
                );
            }
        };

        self.logger.log_calibration(&report);

        let ready = ReadyModel {
            importance: importance_of(artifact.model.as_ref()),
            artifact,
            report,
            band: self.detector.profile().band,
        };
        let summary = ready.summary();
        (ModelState::Ready(Arc::new(ready)), Ok(summary))
    }

    fn publish(&self, state: ModelState) {
        match &state {
            ModelState::Ready(ready) => self.metrics.set_model_loaded(
                ready.artifact.model.model_type(),
                ready.artifact.format,
                ready.report.policy.kind().as_str(),
            ),
            _ => self.metrics.set_model_unloaded(),
        }

        let mut current = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(state);
    }

    fn describe(
        &self,
        artifact: &LoadedArtifact,
        report: Option<&CalibrationReport>,
        error: Option<&PredictorError>,
    ) -> LoadedModelInfo {
        let profile = self.detector.profile();
        LoadedModelInfo {
            model_type: artifact.model.model_type().to_string(),
            format: artifact.format.to_string(),
            path: artifact.path.display().to_string(),
            checksum: artifact.checksum.clone(),
            size_bytes: artifact.size_bytes,
            loaded_at: artifact.loaded_at,
            feature_names: FeatureName::names(),
            n_estimators: artifact.model.estimator_count(),
            feature_importance: importance_of(artifact.model.as_ref()),
            calibrated: report.is_some(),
            calibration: report.cloned(),
            calibration_error: error.map(ToString::to_string),
            input_ranges: profile.input_ranges(),
            plausible_band: profile.band,
        }
    }
}

fn importance_of(model: &dyn ModelArtifact) -> FeatureImportance {
    match model.feature_importances() {
        Some(weights) if weights.len() == FEATURE_COUNT => FeatureImportance::from_weights(weights),
        _ => FeatureImportance::empty(),
    }
}
