//! Model abstraction and the ONNX Runtime backed implementation.
//!
//! Handlers only ever see `Arc<dyn Model>`, built once during bootstrap.

use anyhow::{Context, Result};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

use crate::config::{ModelsConfig, OutputReduction};
use crate::services::preprocess::ImageTensor;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Input is {actual}x{actual} but the model expects {expected}x{expected}")]
    ShapeMismatch { expected: u32, actual: u32 },

    #[error("Model produced no output values")]
    EmptyOutput,

    #[error("Model produced a non-finite score: {0}")]
    NonFinite(f32),

    #[error("Inference runtime error: {0}")]
    Runtime(String),
}

impl From<ort::Error> for InferenceError {
    fn from(err: ort::Error) -> Self {
        Self::Runtime(err.to_string())
    }
}

/// A loaded, read-only model performing one forward pass per call.
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the forward pass and returns the flattened output tensor.
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError>;
}

impl OutputReduction {
    /// Collapses a model output to one score. `None` for empty output.
    #[must_use]
    pub fn reduce(&self, values: &[f32]) -> Option<f32> {
        if values.is_empty() {
            return None;
        }
        match self {
            Self::First => values.first().copied(),
            Self::Max => values.iter().copied().reduce(f32::max),
            Self::Mean => {
                let sum: f64 = values.iter().map(|&v| f64::from(v)).sum();
                #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
                let mean = (sum / values.len() as f64) as f32;
                Some(mean)
            }
        }
    }
}

/// ONNX model exported from the pretrained network.
///
/// `Session::run` needs exclusive access, so concurrent requests serialise
/// on the mutex.
pub struct OnnxModel {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxModel {
    pub fn load(path: &Path, threads: usize) -> Result<Self> {
        if !path.is_file() {
            anyhow::bail!("Model file not found: {}", path.display());
        }

        let mut builder = Session::builder()
            .context("Failed to create inference session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set graph optimization level")?;

        if threads > 0 {
            builder = builder
                .with_intra_threads(threads)
                .context("Failed to set intra-op thread count")?;
        }

        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| anyhow::anyhow!("Model {} declares no inputs", path.display()))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| anyhow::anyhow!("Model {} declares no outputs", path.display()))?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Loaded ONNX model from {}",
            path.display()
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl Model for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
        let tensor = Tensor::from_array((input.shape(), input.data().to_vec()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::Runtime("Model session lock poisoned".to_string()))?;

        let outputs = session.run(vec![(self.input_name.as_str(), tensor)])?;
        let (_, values) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;

        Ok(values.to_vec())
    }
}

/// Loads the classifier and, when configured, the segmentation model.
///
/// Any failure is fatal for the caller: the service never starts with a
/// partially loaded model set.
pub fn load_configured_models(
    models: &ModelsConfig,
) -> Result<(Arc<dyn Model>, Option<Arc<dyn Model>>)> {
    let classifier = OnnxModel::load(Path::new(&models.classifier.path), models.classifier.threads)
        .context("Failed to load classifier model")?;

    let segmenter = match &models.segmenter {
        Some(cfg) => {
            let model = OnnxModel::load(Path::new(&cfg.path), cfg.threads)
                .context("Failed to load segmentation model")?;
            Some(Arc::new(model) as Arc<dyn Model>)
        }
        None => None,
    };

    Ok((Arc::new(classifier), segmenter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reductions() {
        let values = [0.2, 0.9, 0.1, 0.4];
        assert_eq!(OutputReduction::First.reduce(&values), Some(0.2));
        assert_eq!(OutputReduction::Max.reduce(&values), Some(0.9));
        let mean = OutputReduction::Mean.reduce(&values).unwrap();
        assert!((mean - 0.4).abs() < 1e-6);
        assert_eq!(OutputReduction::Max.reduce(&[]), None);
    }

    #[test]
    fn missing_model_file_fails_to_load() {
        let path = std::env::temp_dir().join(format!("missing-{}.onnx", uuid::Uuid::new_v4()));
        let err = OnnxModel::load(&path, 0).err().unwrap();
        assert!(err.to_string().contains("Model file not found"));
    }
}
