use std::sync::Arc;

use crate::config::OutputReduction;
use crate::domain::{Classification, LabelPair};
use crate::services::inference::{InferenceError, Model};
use crate::services::preprocess::ImageTensor;

/// Single forward pass followed by a fixed threshold.
pub struct BinaryClassifier {
    model: Arc<dyn Model>,
    reduction: OutputReduction,
    threshold: f32,
    labels: LabelPair,
    input_size: u32,
}

impl BinaryClassifier {
    #[must_use]
    pub fn new(
        model: Arc<dyn Model>,
        reduction: OutputReduction,
        threshold: f32,
        labels: LabelPair,
        input_size: u32,
    ) -> Self {
        Self {
            model,
            reduction,
            threshold,
            labels,
            input_size,
        }
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn classify(&self, tensor: &ImageTensor) -> Result<Classification, InferenceError> {
        if tensor.size() != self.input_size {
            return Err(InferenceError::ShapeMismatch {
                expected: self.input_size,
                actual: tensor.size(),
            });
        }

        let output = self.model.predict(tensor)?;
        let score = self
            .reduction
            .reduce(&output)
            .ok_or(InferenceError::EmptyOutput)?;

        if !score.is_finite() {
            return Err(InferenceError::NonFinite(score));
        }

        Ok(Classification::from_score(score, self.threshold, &self.labels))
    }
}
