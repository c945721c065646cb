// src/observability/mod.rs
//! Logging and metrics
//!
//! - **Tracing**: `tracing-subscriber` with env-filter, pretty or JSON output
//! - **Metrics**: `metrics` facade exported through Prometheus
//!
//! Metric names are collected in [`names`] so call sites and dashboards agree.

use crate::utils::config::TelemetryConfig;
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Metric names emitted by the engine
pub mod names {
    /// Requests seen, labelled by `path_type` (bypass | standard)
    pub const REQUESTS_TOTAL: &str = "phishwall_requests_total";

    /// Responses skipped for non-HTML content, labelled by `content_type`
    pub const SKIPPED_CONTENT_TOTAL: &str = "phishwall_skipped_content_total";

    /// Blocks, labelled by `cause` (blacklist | classifier | heuristic)
    pub const BLOCKS_TOTAL: &str = "phishwall_blocks_total";

    pub const BYPASS_GRANTED_TOTAL: &str = "phishwall_bypass_granted_total";
    pub const BYPASS_REJECTED_TOTAL: &str = "phishwall_bypass_rejected_total";

    /// Response analysis latency in milliseconds, labelled by `slow`
    pub const ANALYSIS_TIME_MS: &str = "phishwall_analysis_time_ms";

    pub const SCAN_CACHE_HITS_TOTAL: &str = "phishwall_scan_cache_hits_total";

    /// Analysis failures that were allowed through
    pub const FAIL_OPEN_TOTAL: &str = "phishwall_fail_open_total";
}

/// Initialize the global tracing subscriber
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = if config.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_current_span(true)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
    };

    result.map_err(|e| EngineError::ConfigError(format!("Failed to init tracing: {}", e)))
}

/// Install the Prometheus exporter. No-op when `metrics_port` is unset.
pub fn init_metrics(config: &TelemetryConfig) -> Result<()> {
    let Some(port) = config.metrics_port else {
        info!("Metrics exporter disabled");
        return Ok(());
    };

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::ConfigError(format!("Failed to install metrics exporter: {}", e)))?;

    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}
