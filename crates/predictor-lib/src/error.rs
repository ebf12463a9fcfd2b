//! Error taxonomy for the prediction pipeline
//!
//! Every variant is recoverable at the process level: the predictor keeps
//! running in a "not loaded" or "uncalibrated" state and callers surface the
//! error to their users.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PredictorError>;

/// Failure of a single artifact format while decoding a model file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatFailure {
    pub format: &'static str,
    pub reason: String,
}

impl fmt::Display for FormatFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.format, self.reason)
    }
}

#[derive(Debug, Clone, Error)]
pub enum PredictorError {
    #[error("model artifact not found: {}", .path.display())]
    ArtifactNotFound { path: PathBuf },

    #[error(
        "model artifact {} could not be decoded by any format [{}]",
        .path.display(),
        join_failures(.attempts)
    )]
    ArtifactCorrupt {
        path: PathBuf,
        attempts: Vec<FormatFailure>,
    },

    #[error("inference unavailable: {reason}")]
    InferenceUnavailable { reason: String },

    #[error("model not ready: {reason}")]
    ModelNotReady { reason: String },

    #[error("invalid input for '{field}': {reason}")]
    InvalidInput { field: &'static str, reason: String },
}

impl PredictorError {
    /// Stable machine-readable identifier for the error variant
    pub fn kind(&self) -> &'static str {
        match self {
            PredictorError::ArtifactNotFound { .. } => "artifact_not_found",
            PredictorError::ArtifactCorrupt { .. } => "artifact_corrupt",
            PredictorError::InferenceUnavailable { .. } => "inference_unavailable",
            PredictorError::ModelNotReady { .. } => "model_not_ready",
            PredictorError::InvalidInput { .. } => "invalid_input",
        }
    }

    pub(crate) fn inference_unavailable(err: &anyhow::Error) -> Self {
        PredictorError::InferenceUnavailable {
            reason: format!("{:#}", err),
        }
    }

    pub(crate) fn not_ready(reason: impl Into<String>) -> Self {
        PredictorError::ModelNotReady {
            reason: reason.into(),
        }
    }
}

fn join_failures(attempts: &[FormatFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
