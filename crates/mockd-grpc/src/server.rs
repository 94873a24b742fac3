//! gRPC listener lifecycle

use crate::proto::GrpcSchema;
use crate::service::MockGrpcService;
use axum::extract::Request;
use mockd_core::model::GrpcEndpoint;
use mockd_core::{Error, Result};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::info;

/// A running gRPC mock server bound to one port
pub struct GrpcMockServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl GrpcMockServer {
    /// Compile the endpoint's proto file and start serving
    pub async fn start(endpoint: &GrpcEndpoint) -> Result<Self> {
        let schema = GrpcSchema::from_file(&endpoint.proto_file)?;
        let service = MockGrpcService::new(schema, endpoint);

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", endpoint.port))
            .await
            .map_err(Error::Io)?;
        let local_addr = listener.local_addr().map_err(Error::Io)?;
        info!(addr = %local_addr, "grpc mock server listening");

        let router = axum::Router::new().fallback(move |req: Request| {
            let service = service.clone();
            async move { service.dispatch(req).await }
        });

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(e) = serve.await {
                tracing::warn!(error = %e, "grpc server exited with error");
            }
        });

        Ok(Self {
            local_addr,
            shutdown,
        })
    }

    /// The bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and drain
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for GrpcMockServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
