//! HTTP server loop.
//!
//! Plain hyper HTTP/1.1 serving: accept, wrap the stream, and drive one
//! connection per tokio task. The gateway pipeline owns all routing and
//! response construction, so the loop itself stays protocol-only.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use fnrelay_common::{GatewayError, Result};

use crate::pipeline::Gateway;

/// HTTP front end for a [`Gateway`].
pub struct HttpServer {
    gateway: Arc<Gateway>,
}

impl HttpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        HttpServer { gateway }
    }

    /// Binds `addr` and serves until the process exits.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "0.0.0.0:8080")
    ///
    /// # Returns
    /// - `Ok(())` - Server ran and shut down cleanly
    /// - `Err(GatewayError::Transport)` - Bind or accept failure
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Transport(format!("failed to get local address: {}", e)))?;
        tracing::info!("gateway listening on {}", local_addr);

        loop {
            let (stream, _) = listener.accept().await.map_err(|e| {
                GatewayError::Transport(format!("failed to accept connection: {}", e))
            })?;

            let io = TokioIo::new(stream);
            let gateway = self.gateway.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let gateway = gateway.clone();
                    async move { Ok::<_, Infallible>(gateway.handle(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!("error serving connection: {}", err);
                }
            });
        }
    }
}
