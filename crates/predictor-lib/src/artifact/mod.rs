//! Model artifact loading
//!
//! A model file is decoded by an ordered chain of [`ArtifactFormat`]
//! strategies. The first format that accepts the bytes wins; the order is the
//! documented precedence:
//!
//! 1. `tree-ensemble-json` - native tree ensemble / linear encoding, the only
//!    format that carries the estimator family, size and feature importances
//! 2. `onnx` - ONNX graph executed with tract
//!
//! A file that some other library could mis-read still lands in the most
//! specific decoder first.

mod onnx;
mod tree_ensemble;

pub use onnx::{OnnxFormat, OnnxModel};
pub use tree_ensemble::{EnsembleKind, TreeEnsembleFormat, TreeEnsembleModel};

use crate::error::{FormatFailure, PredictorError, Result};
use crate::models::FEATURE_COUNT;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default artifact file name, resolved against the base directory
pub const DEFAULT_MODEL_FILE: &str = "random_forest_model.json";

/// A trained regressor, immutable once loaded
pub trait ModelArtifact: Send + Sync {
    /// Model family / class name (e.g. `RandomForestRegressor`)
    fn model_type(&self) -> &str;

    /// Predict a single output from features already in model space
    fn predict(&self, features: &[f64; FEATURE_COUNT]) -> anyhow::Result<f64>;

    /// Per-feature importances in canonical feature order, if the model has them
    fn feature_importances(&self) -> Option<&[f64]> {
        None
    }

    /// Number of estimators, only for ensemble models
    fn estimator_count(&self) -> Option<usize> {
        None
    }
}

/// A serialization format able to decode model bytes
pub trait ArtifactFormat: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, bytes: &[u8]) -> anyhow::Result<Box<dyn ModelArtifact>>;
}

/// A decoded artifact plus the metadata recorded while loading it
#[derive(Clone)]
pub struct LoadedArtifact {
    pub model: Arc<dyn ModelArtifact>,
    pub path: PathBuf,
    pub format: &'static str,
    pub checksum: String,
    pub size_bytes: u64,
    pub loaded_at: i64,
}

impl fmt::Debug for LoadedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedArtifact")
            .field("model_type", &self.model.model_type())
            .field("path", &self.path)
            .field("format", &self.format)
            .field("checksum", &self.checksum)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

/// Loads artifacts by trying each format in precedence order
pub struct ArtifactLoader {
    formats: Vec<Box<dyn ArtifactFormat>>,
}

impl ArtifactLoader {
    /// Loader with the default precedence: tree-ensemble JSON, then ONNX
    pub fn new() -> Self {
        Self::with_formats(vec![Box::new(TreeEnsembleFormat), Box::new(OnnxFormat)])
    }

    pub fn with_formats(formats: Vec<Box<dyn ArtifactFormat>>) -> Self {
        Self { formats }
    }

    pub fn format_names(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.name()).collect()
    }

    /// Read and decode the artifact at an already resolved path
    pub fn load(&self, path: &Path) -> Result<LoadedArtifact> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PredictorError::ArtifactNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(PredictorError::ArtifactCorrupt {
                    path: path.to_path_buf(),
                    attempts: vec![FormatFailure {
                        format: "io",
                        reason: e.to_string(),
                    }],
                });
            }
        };

        let checksum = compute_checksum(&bytes);
        let mut attempts = Vec::with_capacity(self.formats.len());

        for format in &self.formats {
            match format.decode(&bytes) {
                Ok(model) => {
                    info!(
                        path = %path.display(),
                        format = format.name(),
                        model_type = %model.model_type(),
                        n_estimators = ?model.estimator_count(),
                        checksum = %checksum,
                        "Model artifact decoded"
                    );
                    return Ok(LoadedArtifact {
                        model: Arc::from(model),
                        path: path.to_path_buf(),
                        format: format.name(),
                        checksum,
                        size_bytes: bytes.len() as u64,
                        loaded_at: chrono::Utc::now().timestamp(),
                    });
                }
                Err(e) => {
                    debug!(
                        path = %path.display(),
                        format = format.name(),
                        error = %format!("{:#}", e),
                        "Artifact format rejected file, trying next"
                    );
                    attempts.push(FormatFailure {
                        format: format.name(),
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        warn!(
            path = %path.display(),
            attempts = attempts.len(),
            "No artifact format could decode the model file"
        );

        Err(PredictorError::ArtifactCorrupt {
            path: path.to_path_buf(),
            attempts,
        })
    }
}

impl Default for ArtifactLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a possibly relative artifact path against a base directory
///
/// Without an explicit base the directory of the running executable is used,
/// falling back to the working directory.
pub fn resolve_artifact_path(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match base_dir {
        Some(base) => base.join(path),
        None => default_base_dir().join(path),
    }
}

pub fn default_base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
