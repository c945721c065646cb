// src/classifier/adapter.rs
//! Feature extraction + scoring behind one call
//!
//! `predict` never fails: malformed URLs and a missing scorer both produce a
//! non-phishing verdict with zero confidence.

use crate::classifier::features::{FeatureExtractor, FeatureVector};
use crate::classifier::scorer::PhishingScorer;
use crate::utils::errors::{EngineError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Default probability at or above which a URL is classified as phishing
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Outcome of one classification
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationVerdict {
    pub is_phishing_by_threshold: bool,

    /// Phishing probability in `[0, 1]`
    pub confidence: f64,

    pub elapsed: Duration,
}

impl ClassificationVerdict {
    fn benign(elapsed: Duration) -> Self {
        Self {
            is_phishing_by_threshold: false,
            confidence: 0.0,
            elapsed,
        }
    }
}

pub struct ClassificationAdapter {
    extractor: FeatureExtractor,
    scorer: Option<Arc<dyn PhishingScorer>>,
    threshold: f64,
}

impl ClassificationAdapter {
    pub fn new(extractor: FeatureExtractor, scorer: Option<Arc<dyn PhishingScorer>>, threshold: f64) -> Self {
        if scorer.is_none() {
            warn!("Classification adapter created without a scorer; every URL will score 0.0");
        }

        Self {
            extractor,
            scorer,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn has_scorer(&self) -> bool {
        self.scorer.is_some()
    }

    /// Feature vector for `url`, `None` when the URL is malformed
    pub fn extract_features(&self, url: &str) -> Option<FeatureVector> {
        match self.extractor.extract(url) {
            Ok(features) => Some(features),
            Err(e) => {
                debug!("Feature extraction failed: {}", e);
                None
            }
        }
    }

    /// Phishing probability for `url`
    pub fn try_predict(&self, url: &str) -> Result<f64> {
        let scorer = self
            .scorer
            .as_ref()
            .ok_or_else(|| EngineError::ScorerUnavailable("No scoring model loaded".to_string()))?;

        let features = self.extractor.extract(url)?;
        scorer.score(&features.scoring_vector())
    }

    /// Classify `url`. Page content is accepted for future content features
    /// and currently unused.
    pub fn predict(&self, url: &str, _html: &str) -> ClassificationVerdict {
        let start = Instant::now();

        let confidence = match self.try_predict(url) {
            Ok(p) => p,
            Err(EngineError::ScorerUnavailable(reason)) => {
                error!(url = %url, "Scorer unavailable: {}", reason);
                return ClassificationVerdict::benign(start.elapsed());
            }
            Err(e) => {
                warn!(url = %url, "Classification skipped: {}", e);
                return ClassificationVerdict::benign(start.elapsed());
            }
        };

        let verdict = ClassificationVerdict {
            is_phishing_by_threshold: confidence >= self.threshold,
            confidence,
            elapsed: start.elapsed(),
        };

        debug!(
            url = %url,
            confidence = verdict.confidence,
            phishing = verdict.is_phishing_by_threshold,
            "Classification completed in {:?}",
            verdict.elapsed
        );

        verdict
    }
}
