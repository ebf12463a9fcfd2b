//! ONNX artifacts executed with tract
//!
//! The graph must take a single `[1, 4]` f32 input in canonical feature order
//! and produce the prediction as the first element of its first output.

use super::{ArtifactFormat, ModelArtifact};
use crate::models::FEATURE_COUNT;
use anyhow::{Context, Result};
use tract_onnx::prelude::*;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX regressor, optimized into a runnable tract plan
pub struct OnnxModel {
    plan: TractModel,
}

impl OnnxModel {
    /// Load and optimize an ONNX model from bytes
    pub fn from_bytes(model_bytes: &[u8]) -> Result<Self> {
        let plan = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, FEATURE_COUNT]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(Self { plan })
    }

    fn features_to_tensor(features: &[f64; FEATURE_COUNT]) -> Result<Tensor> {
        let data: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let array = tract_ndarray::Array2::from_shape_vec((1, FEATURE_COUNT), data)
            .context("Failed to shape input tensor")?;
        Ok(array.into())
    }
}

impl ModelArtifact for OnnxModel {
    fn model_type(&self) -> &str {
        "OnnxModel"
    }

    fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Result<f64> {
        let input = Self::features_to_tensor(features)?;
        let result = self.plan.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;

        let view = output
            .to_array_view::<f32>()
            .context("Model output is not an f32 tensor")?;
        let value = view.iter().next().copied().context("Model output is empty")?;
        Ok(f64::from(value))
    }
}

/// `onnx` artifact format
pub struct OnnxFormat;

impl ArtifactFormat for OnnxFormat {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn ModelArtifact>> {
        Ok(Box::new(OnnxModel::from_bytes(bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_onnx_bytes() {
        assert!(OnnxModel::from_bytes(b"not a protobuf graph").is_err());
        assert!(OnnxFormat.decode(b"\x00\x00\x00\x00").is_err());
    }

    #[test]
    fn test_input_tensor_shape() {
        let tensor = OnnxModel::features_to_tensor(&[19.07, 1013.25, 67.87, 54.30]).unwrap();
        assert_eq!(tensor.shape(), &[1, FEATURE_COUNT]);
    }
}
