//! Shared state for the HTTP pipeline

use crate::hooks::RouteHook;
use mockd_chaos::ChaosInjector;
use mockd_core::{MockRegistry, RequestLog, ResourceStore};
use mockd_observability::MetricsRegistry;
use std::sync::Arc;

/// Default reserved prefix on the traffic port
pub const RESERVED_PREFIX: &str = "/__mockd";

/// Everything the pipeline needs per request
#[derive(Clone)]
pub struct HttpState {
    pub registry: Arc<MockRegistry>,
    pub resources: Arc<ResourceStore>,
    pub request_log: Arc<RequestLog>,
    pub chaos: Arc<ChaosInjector>,
    pub metrics: MetricsRegistry,
    /// Path prefixes excluded from tracing
    pub trace_skip: Arc<Vec<String>>,
    /// Protocol adapters consulted ahead of mock dispatch
    pub hooks: Arc<Vec<Arc<dyn RouteHook>>>,
}

impl HttpState {
    /// Build state with the default trace skip-set
    pub fn new(
        registry: Arc<MockRegistry>,
        resources: Arc<ResourceStore>,
        request_log: Arc<RequestLog>,
        chaos: Arc<ChaosInjector>,
        metrics: MetricsRegistry,
    ) -> Self {
        Self {
            registry,
            resources,
            request_log,
            chaos,
            metrics,
            trace_skip: Arc::new(vec![
                "/health".to_string(),
                "/metrics".to_string(),
                RESERVED_PREFIX.to_string(),
            ]),
            hooks: Arc::new(Vec::new()),
        }
    }

    /// Attach protocol hooks (WebSocket endpoints, GraphQL paths)
    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn RouteHook>>) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Replace the trace skip-set
    pub fn with_trace_skip(mut self, prefixes: Vec<String>) -> Self {
        self.trace_skip = Arc::new(prefixes);
        self
    }

    /// True when tracing should skip this path
    pub fn skip_tracing(&self, path: &str) -> bool {
        self.trace_skip
            .iter()
            .any(|prefix| path == prefix || path.starts_with(&format!("{prefix}/")))
    }
}
