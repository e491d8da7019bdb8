use serde::{Deserialize, Serialize};
use std::fmt;

/// The two labels a binary model chooses between.
///
/// `positive` is selected when the score reaches the decision threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPair {
    pub positive: String,
    pub negative: String,
}

impl LabelPair {
    #[must_use]
    pub fn new(positive: impl Into<String>, negative: impl Into<String>) -> Self {
        Self {
            positive: positive.into(),
            negative: negative.into(),
        }
    }
}

/// Probability of the chosen label, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Confidence(f32);

impl Confidence {
    #[must_use]
    pub fn new(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    #[must_use]
    pub const fn value(&self) -> f32 {
        self.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0 * 100.0)
    }
}

/// Outcome of a single forward pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub confidence: Confidence,
    /// Raw reduced model score before thresholding.
    pub score: f32,
}

impl Classification {
    /// Applies `threshold` to `score`: at or above selects the positive label.
    #[must_use]
    pub fn from_score(score: f32, threshold: f32, labels: &LabelPair) -> Self {
        if score >= threshold {
            Self {
                label: labels.positive.clone(),
                confidence: Confidence::new(score),
                score,
            }
        } else {
            Self {
                label: labels.negative.clone(),
                confidence: Confidence::new(1.0 - score),
                score,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundary_selects_positive() {
        let labels = LabelPair::new("Cat", "Dog");

        let at = Classification::from_score(0.5, 0.5, &labels);
        assert_eq!(at.label, "Cat");

        let below = Classification::from_score(0.2, 0.5, &labels);
        assert_eq!(below.label, "Dog");
        assert!((below.confidence.value() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn confidence_is_clamped_and_formatted() {
        assert!((Confidence::new(1.7).value() - 1.0).abs() < f32::EPSILON);
        assert_eq!(Confidence::new(0.875).to_string(), "87.5%");
    }
}
