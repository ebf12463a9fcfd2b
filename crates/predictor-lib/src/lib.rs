//! Power output prediction for combined-cycle power plants
//!
//! This crate provides the core functionality for:
//! - Loading trained regressors from disk with format fallback
//! - Detecting whether a model expects raw or standardized inputs
//! - Single and batch inference with typed errors
//! - Health checks and observability

pub mod artifact;
pub mod calibration;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;

pub use error::{FormatFailure, PredictorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PredictorMetrics, StructuredLogger};
pub use predictor::{coerce_field, LoadSummary, Predictor, PredictorConfig};
