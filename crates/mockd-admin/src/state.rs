//! Shared state for the admin plane

use mockd_chaos::ChaosInjector;
use mockd_core::{MockRegistry, RequestLog, ResourceStore};
use mockd_observability::MetricsRegistry;
use mockd_ws::WsManager;
use std::sync::Arc;

/// Everything the admin handlers reach into
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<MockRegistry>,
    pub resources: Arc<ResourceStore>,
    pub request_log: Arc<RequestLog>,
    pub chaos: Arc<ChaosInjector>,
    pub ws: Arc<WsManager>,
    pub metrics: MetricsRegistry,
    /// API key; `None` disables the gate (for tests and the control port)
    pub api_key: Option<String>,
}

impl AdminState {
    /// Build state with the gate disabled
    pub fn new(
        registry: Arc<MockRegistry>,
        resources: Arc<ResourceStore>,
        request_log: Arc<RequestLog>,
        chaos: Arc<ChaosInjector>,
        ws: Arc<WsManager>,
        metrics: MetricsRegistry,
    ) -> Self {
        Self {
            registry,
            resources,
            request_log,
            chaos,
            ws,
            metrics,
            api_key: None,
        }
    }

    /// Pin the gate to a constant key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}
