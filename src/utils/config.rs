// src/utils/config.rs
//! Engine configuration
//!
//! Settings are layered: built-in defaults, then an optional config file
//! (TOML, JSON or YAML, detected by extension), then `PHISHWALL__`-prefixed
//! environment variables (e.g. `PHISHWALL__POLICY__SCAN_TIMEOUT_MS=250`).

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "PHISHWALL_CONFIG";

/// Config file used when `PHISHWALL_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "phishwall.toml";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub policy: PolicyConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

/// Management service listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Interception policy knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Analysis latency above which a flow is logged as slow. Never enforced.
    pub scan_timeout_ms: u64,

    /// Scan cache entry lifetime in seconds
    pub cache_duration: u64,

    /// Path suffixes that are never analyzed
    pub exclude_extensions: Vec<String>,

    /// Host substrings (resource CDNs) that are never analyzed
    pub exclude_domains: Vec<String>,

    /// Classifier probability at or above which a page is phishing
    pub ml_confidence_threshold: f64,

    /// Reserved path for bypass redemption
    pub bypass_path: String,

    /// Responses larger than this are passed through unanalyzed
    pub max_body_bytes: usize,

    /// Heuristic pattern count above which a page is blocked
    pub heuristic_block_threshold: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 500,
            cache_duration: 3600,
            exclude_extensions: [".js", ".css", ".jpg", ".png", ".gif", ".svg", ".woff", ".woff2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_domains: ["googleapis.com", "gstatic.com", "jquery.com", "cloudflare.com"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ml_confidence_threshold: 0.85,
            bypass_path: "/bypass".to_string(),
            max_body_bytes: 1_000_000,
            heuristic_block_threshold: 2,
        }
    }
}

/// Partial policy update; `None` leaves the current value in place
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyOverrides {
    pub scan_timeout_ms: Option<u64>,
    pub cache_duration: Option<u64>,
    pub exclude_extensions: Option<Vec<String>>,
    pub exclude_domains: Option<Vec<String>>,
    pub ml_confidence_threshold: Option<f64>,
}

impl PolicyConfig {
    /// Apply overrides field by field, then validate the result
    pub fn merge(&mut self, overrides: PolicyOverrides) -> Result<()> {
        let mut merged = self.clone();

        if let Some(v) = overrides.scan_timeout_ms {
            merged.scan_timeout_ms = v;
        }
        if let Some(v) = overrides.cache_duration {
            merged.cache_duration = v;
        }
        if let Some(v) = overrides.exclude_extensions {
            merged.exclude_extensions = v;
        }
        if let Some(v) = overrides.exclude_domains {
            merged.exclude_domains = v;
        }
        if let Some(v) = overrides.ml_confidence_threshold {
            merged.ml_confidence_threshold = v;
        }

        merged.validate()?;
        *self = merged;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.ml_confidence_threshold) {
            return Err(EngineError::ConfigError(format!(
                "ml_confidence_threshold must be within [0, 1], got {}",
                self.ml_confidence_threshold
            )));
        }
        if !self.bypass_path.starts_with('/') {
            return Err(EngineError::ConfigError(format!(
                "bypass_path must start with '/', got {}",
                self.bypass_path
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(EngineError::ConfigError(
                "max_body_bytes cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// On-disk locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persisted whitelist (JSON array)
    pub whitelist_path: PathBuf,

    /// Scoring model weights (JSON)
    pub model_path: PathBuf,

    /// Popular brand names, one per line
    pub brands_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            whitelist_path: PathBuf::from("whitelist.json"),
            model_path: PathBuf::from("phishing_model.json"),
            brands_path: PathBuf::from("popular_brands.txt"),
        }
    }
}

/// Logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json_logs: bool,

    /// Prometheus scrape port; `None` disables the exporter
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_port: Some(9100),
        }
    }
}

impl EngineConfig {
    /// Load from `PHISHWALL_CONFIG` (or `phishwall.toml`) plus environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load from an explicit file path plus environment. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("PHISHWALL").separator("__"))
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.policy.validate()?;

        info!(
            "Configuration loaded: threshold={}, scan_timeout_ms={}",
            config.policy.ml_confidence_threshold, config.policy.scan_timeout_ms
        );

        Ok(config)
    }
}
