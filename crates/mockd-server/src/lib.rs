//! # mockd server
//!
//! Server assembly: the traffic port (HTTP pipeline with WebSocket and
//! GraphQL hooks), the admin port, the optional unauthenticated control
//! port, and the supervisor that reconciles per-protocol listeners against
//! registry changes. Shutdown follows a strict order: stop admin accept,
//! stop traffic accept, cancel long-lived loops, drain within the grace
//! period, then force-close.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mockd_server::{MockdServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = MockdServer::start(ServerConfig::default()).await?;
//!     println!("traffic on {}", server.traffic_addr());
//!     server.wait_for_ctrl_c().await;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod lifecycle;

pub use config::ServerConfig;
pub use lifecycle::Supervisor;

use mockd_admin::{admin_router, AdminState};
use mockd_chaos::ChaosInjector;
use mockd_core::{MockRegistry, RequestLog, ResourceStore};
use mockd_graphql::GraphqlHook;
use mockd_http::{build_router, HttpState, RouteHook};
use mockd_observability::{init_logging, MetricsRegistry};
use mockd_ws::WsHook;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A running mockd instance
pub struct MockdServer {
    config: ServerConfig,
    registry: Arc<MockRegistry>,
    resources: Arc<ResourceStore>,
    request_log: Arc<RequestLog>,
    chaos: Arc<ChaosInjector>,
    supervisor: Arc<Supervisor>,
    metrics: MetricsRegistry,
    traffic_addr: SocketAddr,
    admin_addr: SocketAddr,
    control_addr: Option<SocketAddr>,
    admin_stop: watch::Sender<bool>,
    traffic_stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MockdServer {
    /// Bind all listeners and start serving
    pub async fn start(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        init_logging("info");

        let registry = Arc::new(MockRegistry::new());
        let resources = Arc::new(ResourceStore::new());
        let request_log = Arc::new(RequestLog::new(config.request_log_capacity));
        let chaos = Arc::new(match &config.chaos {
            Some(chaos_config) => ChaosInjector::new(chaos_config.clone())?,
            None => ChaosInjector::disabled(),
        });
        let metrics = MetricsRegistry::new();
        let supervisor = Supervisor::new(Arc::clone(&registry), metrics.clone());

        // Traffic router with the protocol hooks wired in.
        let hooks: Vec<Arc<dyn RouteHook>> = vec![
            Arc::new(WsHook(Arc::clone(&supervisor.ws))),
            Arc::new(GraphqlHook(Arc::clone(&supervisor.graphql))),
        ];
        let mut http_state = HttpState::new(
            Arc::clone(&registry),
            Arc::clone(&resources),
            Arc::clone(&request_log),
            Arc::clone(&chaos),
            metrics.clone(),
        )
        .with_hooks(hooks);
        if let Some(trace_skip) = &config.trace_skip {
            http_state = http_state.with_trace_skip(trace_skip.clone());
        }
        let traffic_router = build_router(http_state, config.cors.as_ref());

        let admin_state = {
            let mut state = AdminState::new(
                Arc::clone(&registry),
                Arc::clone(&resources),
                Arc::clone(&request_log),
                Arc::clone(&chaos),
                Arc::clone(&supervisor.ws),
                metrics.clone(),
            );
            if let Some(key) = &config.api_key {
                state = state.with_api_key(key.clone());
            }
            state
        };
        let control_state = AdminState::new(
            Arc::clone(&registry),
            Arc::clone(&resources),
            Arc::clone(&request_log),
            Arc::clone(&chaos),
            Arc::clone(&supervisor.ws),
            metrics.clone(),
        );

        let (traffic_stop, traffic_stop_rx) = watch::channel(false);
        let (admin_stop, admin_stop_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let traffic_listener = TcpListener::bind(("0.0.0.0", config.http_port)).await?;
        let traffic_addr = traffic_listener.local_addr()?;
        tasks.push(serve(traffic_listener, traffic_router, traffic_stop_rx.clone()));

        let admin_listener = TcpListener::bind(("0.0.0.0", config.admin_port)).await?;
        let admin_addr = admin_listener.local_addr()?;
        tasks.push(serve(
            admin_listener,
            admin_router(admin_state),
            admin_stop_rx.clone(),
        ));

        let control_addr = match config.control_port {
            Some(port) => {
                let listener = TcpListener::bind(("127.0.0.1", port)).await?;
                let addr = listener.local_addr()?;
                tasks.push(serve(listener, admin_router(control_state), admin_stop_rx));
                Some(addr)
            }
            None => None,
        };

        // Seed initial state; the registry replace drives the supervisor.
        for spec in &config.stateful_resources {
            resources.register(spec.clone())?;
        }
        if let Some(collection) = config.collection.clone() {
            collection.validate()?;
            for spec in &collection.stateful_resources {
                resources.register(spec.clone())?;
            }
            registry.replace_all(collection.into_mocks())?;
        }

        info!(
            traffic = %traffic_addr,
            admin = %admin_addr,
            control = ?control_addr,
            "mockd server started"
        );
        Ok(Self {
            config,
            registry,
            resources,
            request_log,
            chaos,
            supervisor,
            metrics,
            traffic_addr,
            admin_addr,
            control_addr,
            admin_stop,
            traffic_stop,
            tasks,
        })
    }

    /// Bound traffic-port address
    pub fn traffic_addr(&self) -> SocketAddr {
        self.traffic_addr
    }

    /// Bound admin-port address
    pub fn admin_addr(&self) -> SocketAddr {
        self.admin_addr
    }

    /// Bound control-port address, when enabled
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_addr
    }

    /// The mock registry
    pub fn registry(&self) -> &Arc<MockRegistry> {
        &self.registry
    }

    /// The stateful resource store
    pub fn resources(&self) -> &Arc<ResourceStore> {
        &self.resources
    }

    /// The request log
    pub fn request_log(&self) -> &Arc<RequestLog> {
        &self.request_log
    }

    /// The chaos injector
    pub fn chaos(&self) -> &Arc<ChaosInjector> {
        &self.chaos
    }

    /// The protocol supervisor
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// The metrics registry
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Block until Ctrl-C
    pub async fn wait_for_ctrl_c(&self) {
        let _ = tokio::signal::ctrl_c().await;
    }

    /// Graceful shutdown in the documented order
    pub async fn shutdown(mut self) {
        info!("shutting down: closing admin accept");
        let _ = self.admin_stop.send(true);
        info!("shutting down: closing traffic accept");
        let _ = self.traffic_stop.send(true);
        info!("shutting down: cancelling protocol loops");
        self.supervisor.shutdown_all();

        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!("grace period expired, force-closing listener task");
                task.abort();
            }
        }
        info!("shutdown complete");
    }
}

fn serve(
    listener: TcpListener,
    router: axum::Router,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let shutdown = async move {
            let _ = stop.changed().await;
        };
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            warn!(error = %e, "listener exited with error");
        }
    })
}
