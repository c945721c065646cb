// src/management/server.rs
//! HTTP/1.1 listener for the management API

use crate::management::handlers::{self, ManagementState};
use crate::utils::errors::{EngineError, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Management API server
pub struct ManagementServer {
    listener: TcpListener,
    state: Arc<ManagementState>,
}

impl ManagementServer {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr, state: Arc<ManagementState>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| EngineError::ManagementFailed(format!("Failed to bind {}: {}", addr, e)))?;

        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("Management API listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Management API shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&self.state);

                        tokio::spawn(async move {
                            debug!("Accepted connection from {}", addr);

                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let state = Arc::clone(&state);
                                async move { Ok::<_, Infallible>(handlers::handle(&state, req).await) }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::InterceptionPipeline;
    use crate::utils::config::EngineConfig;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Empty};
    use hyper::Request;
    use hyper_util::client::legacy::Client;
    use hyper_util::rt::TokioExecutor;

    #[tokio::test]
    async fn test_serves_health_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.whitelist_path = dir.path().join("whitelist.json");
        config.storage.model_path = dir.path().join("missing_model.json");
        config.storage.brands_path = dir.path().join("missing_brands.txt");

        let pipeline = Arc::new(InterceptionPipeline::from_config(&config).unwrap());
        let state = Arc::new(ManagementState::new(pipeline));

        let server = ManagementServer::bind("127.0.0.1:0".parse().unwrap(), state).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async {
            let _ = stop_rx.await;
        }));

        let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
        let req = Request::get(format!("http://{}/health", addr))
            .body(Empty::new())
            .unwrap();
        let resp = client.request(req).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["scorer_loaded"], false);

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
