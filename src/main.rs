// src/main.rs
//! PhishWall Engine
//!
//! Loads configuration, builds the interception pipeline and serves the
//! management API until interrupted.

use anyhow::{Context, Result};
use phishwall_engine::management::{ManagementServer, ManagementState};
use phishwall_engine::observability::{init_metrics, init_tracing};
use phishwall_engine::utils::config::EngineConfig;
use phishwall_engine::{BuildInfo, InterceptionPipeline};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first: it decides log level and format
    let config = EngineConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.telemetry)?;
    init_metrics(&config.telemetry)?;

    let build = BuildInfo::current();
    info!(
        "Starting PhishWall Engine v{} ({}, built {})",
        build.version, build.git_hash, build.build_timestamp
    );
    info!("Configuration loaded: {:?}", config);

    let pipeline = Arc::new(InterceptionPipeline::from_config(&config).context("Failed to build pipeline")?);
    info!(
        "Pipeline ready: {} whitelist patterns, threshold {}",
        pipeline.trust().whitelist_len(),
        pipeline.policy().ml_confidence_threshold
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = Arc::new(ManagementState::new(pipeline));
    let server = ManagementServer::bind(addr, state).await?;

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    match server.run(shutdown_signal).await {
        Ok(()) => {
            info!("Server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e.into())
        }
    }
}
