// src/classifier/scorer.rs
//! Scoring contract and the bundled logistic scorer

use crate::classifier::features::SCORING_FEATURE_COUNT;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Turns a scoring vector into a phishing probability in `[0, 1]`
pub trait PhishingScorer: Send + Sync {
    fn score(&self, features: &[f64]) -> Result<f64>;

    fn name(&self) -> &str;
}

/// Linear model with a sigmoid link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticScorer {
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl LogisticScorer {
    pub fn new(bias: f64, weights: Vec<f64>) -> Result<Self> {
        let scorer = Self { bias, weights };
        scorer.validate()?;
        Ok(scorer)
    }

    /// Load `{"bias": .., "weights": [..]}` from a JSON model file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::ScorerUnavailable(format!("Failed to read model {}: {}", path.display(), e))
        })?;
        let scorer: Self = serde_json::from_str(&raw)?;
        scorer.validate()?;

        info!("Loaded logistic model from {} ({} weights)", path.display(), scorer.weights.len());
        Ok(scorer)
    }

    fn validate(&self) -> Result<()> {
        if self.weights.len() != SCORING_FEATURE_COUNT {
            return Err(EngineError::ScorerUnavailable(format!(
                "Model expects {} weights, found {}",
                SCORING_FEATURE_COUNT,
                self.weights.len()
            )));
        }

        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(EngineError::ScorerUnavailable(
                "Model contains non-finite parameters".to_string(),
            ));
        }

        Ok(())
    }
}

impl PhishingScorer for LogisticScorer {
    fn score(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.weights.len() {
            return Err(EngineError::FeatureExtraction(format!(
                "Expected {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }

        let z = self.bias
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>();

        let probability = 1.0 / (1.0 + (-z).exp());
        if probability.is_nan() {
            return Err(EngineError::FeatureExtraction("Score is not a number".to_string()));
        }

        Ok(probability.clamp(0.0, 1.0))
    }

    fn name(&self) -> &str {
        "logistic"
    }
}
