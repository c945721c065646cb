// src/lib.rs
//! PhishWall Engine Library
//!
//! Interception policy engine that decides, per observed web request and
//! response, whether to allow, block or redirect it.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **trust**: whitelist patterns, runtime blacklist, per-client trust cache
//! - **bypass**: time-windowed, single-use block override tokens
//! - **heuristics**: keyword and script-pattern scanner with a FIFO cache
//! - **classifier**: URL feature extraction and phishing scoring
//! - **interception**: request/response pipeline and hyper adapter
//! - **management**: JSON API for whitelist upkeep and on-demand scans
//! - **observability**: tracing and Prometheus metrics
//! - **utils**: configuration, errors, clock

// Public module exports
pub mod bypass;
pub mod classifier;
pub mod heuristics;
pub mod interception;
pub mod management;
pub mod observability;
pub mod trust;
pub mod utils;

// Re-export commonly used types
pub use interception::{FlowContext, FlowRequest, FlowResponse, InterceptionPipeline, RequestOutcome, ResponseOutcome};
pub use trust::TrustStore;
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
