//! Fuses the text and behavior blocks into one comparable feature space.

use super::matrix::{hstack, standardize, FeatureMatrix};
use crate::{ReactmapError, Result};
use tracing::debug;

/// Standardises each block, applies its weight and concatenates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureCombiner {
    text_weight: f64,
    behavior_weight: f64,
}

impl FeatureCombiner {
    /// Validate and normalise the weights so they sum to 1.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if either weight is negative or not finite, or if both are zero.
    pub fn new(text_weight: f64, behavior_weight: f64) -> Result<Self> {
        if !text_weight.is_finite() || !behavior_weight.is_finite() {
            return Err(ReactmapError::invalid_config("Weights must be finite numbers"));
        }
        if text_weight < 0.0 || behavior_weight < 0.0 {
            return Err(ReactmapError::invalid_config(format!(
                "Weights must be non-negative (text={}, behavior={})",
                text_weight, behavior_weight
            )));
        }
        let total = text_weight + behavior_weight;
        if total <= 0.0 {
            return Err(ReactmapError::invalid_config("At least one weight must be positive"));
        }

        Ok(Self {
            text_weight: text_weight / total,
            behavior_weight: behavior_weight / total,
        })
    }

    /// Normalised text weight.
    pub fn text_weight(&self) -> f64 {
        self.text_weight
    }

    /// Normalised behavior weight.
    pub fn behavior_weight(&self) -> f64 {
        self.behavior_weight
    }

    /// `[standardise(text) * w_text | standardise(behavior) * w_behavior]`.
    ///
    /// Zero-width blocks pass through untouched. Zero rows give an empty
    /// matrix of the combined width.
    pub fn combine(&self, text: &FeatureMatrix, behavior: &FeatureMatrix) -> Result<FeatureMatrix> {
        if text.nrows() == 0 && behavior.nrows() == 0 {
            return Ok(FeatureMatrix::zeros((0, text.ncols() + behavior.ncols())));
        }

        let combined = hstack(
            &weighted_block(text, self.text_weight),
            &weighted_block(behavior, self.behavior_weight),
        )?;

        debug!(
            target: "reactmap::features",
            "Combined features: {} x {} (text weight {:.3}, behavior weight {:.3})",
            combined.nrows(),
            combined.ncols(),
            self.text_weight,
            self.behavior_weight
        );
        Ok(combined)
    }
}

fn weighted_block(block: &FeatureMatrix, weight: f64) -> FeatureMatrix {
    if block.ncols() == 0 {
        return block.clone();
    }
    standardize(block) * weight
}
