// src/classifier/mod.rs
//! URL classification
//!
//! - **Features**: 29 URL features in model order (`tld` dropped before scoring)
//! - **Scorer**: the `PhishingScorer` contract and a JSON-loaded logistic model
//! - **Adapter**: `predict(url, html)` with a configurable threshold
//!
//! ```text
//! url ─► FeatureExtractor ─► [f64; 28] ─► PhishingScorer ─► p
//!                                                            │
//!                                   p >= threshold ◄─────────┘
//! ```

pub mod adapter;
pub mod features;
pub mod scorer;

pub use adapter::{ClassificationAdapter, ClassificationVerdict, DEFAULT_CONFIDENCE_THRESHOLD};
pub use features::{BrandList, FeatureExtractor, FeatureVector, FEATURE_NAMES, SCORING_FEATURE_COUNT};
pub use scorer::{LogisticScorer, PhishingScorer};
