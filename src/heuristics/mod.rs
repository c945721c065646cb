// src/heuristics/mod.rs
//! Heuristic content analysis
//!
//! - **Scanner**: keyword, script-pattern, iframe and inline-script detectors
//! - **Cache**: 100-entry FIFO result cache keyed by exact URL
//!
//! # Scan order
//!
//! ```text
//! analyze(url, html)
//!   ├─ host whitelisted?  ──► empty result (no regex work, not cached)
//!   ├─ cached?            ──► cached result
//!   └─ keywords → script patterns → iframes > 3 → scripts > 5 → cache insert
//! ```

pub mod cache;
pub mod scanner;

pub use cache::{ScanCache, DEFAULT_CACHE_CAPACITY};
pub use scanner::{AnalysisResult, HeuristicScanner, ScannerStats, PHISHING_KEYWORDS};
