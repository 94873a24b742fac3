//! # mockd http
//!
//! The HTTP request pipeline: transport in, middleware chain, dispatch to
//! the matcher engine, response rendering, and the stateful-resource REST
//! surface.
//!
//! The pipeline composes as: tracing, metrics, CORS, request log, chaos,
//! then dispatch (matcher -> stateful resources -> 404). WebSocket and
//! GraphQL adapters participate through route hooks consulted ahead of the
//! matcher, so upgrades reach them with the request intact.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mockd_http::{build_router, HttpState};
//! use mockd_chaos::ChaosInjector;
//! use mockd_core::{MockRegistry, RequestLog, ResourceStore};
//! use mockd_observability::MetricsRegistry;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = HttpState::new(
//!     Arc::new(MockRegistry::new()),
//!     Arc::new(ResourceStore::new()),
//!     Arc::new(RequestLog::new(1000)),
//!     Arc::new(ChaosInjector::disabled()),
//!     MetricsRegistry::new(),
//! );
//! let router = build_router(state, None);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod hooks;
pub mod middleware;
pub mod render;
pub mod resources;
pub mod state;

pub use dispatch::dispatch_handler;
pub use hooks::RouteHook;
pub use state::{HttpState, RESERVED_PREFIX};

use axum::body::Body;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// CORS settings applied to the traffic port
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
    /// Allowed origins; `*` or empty means any
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Allowed methods; empty means any
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    /// Allowed request headers; empty means any
    #[serde(default)]
    pub allowed_headers: Vec<String>,
}

impl CorsConfig {
    /// Build the tower-http layer (also short-circuits OPTIONS preflight)
    pub fn layer(&self) -> CorsLayer {
        let mut layer = CorsLayer::new();
        layer = if self.allowed_origins.is_empty()
            || self.allowed_origins.iter().any(|o| o == "*")
        {
            layer.allow_origin(Any)
        } else {
            let origins: Vec<HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            layer.allow_origin(AllowOrigin::list(origins))
        };
        layer = if self.allowed_methods.is_empty() {
            layer.allow_methods(Any)
        } else {
            let methods: Vec<Method> = self
                .allowed_methods
                .iter()
                .filter_map(|m| m.parse().ok())
                .collect();
            layer.allow_methods(methods)
        };
        if self.allowed_headers.is_empty() {
            layer.allow_headers(Any)
        } else {
            let headers: Vec<HeaderName> = self
                .allowed_headers
                .iter()
                .filter_map(|h| h.parse().ok())
                .collect();
            layer.allow_headers(headers)
        }
    }
}

/// Assemble the traffic router
///
/// Protocol adapters that live on this port (WebSocket endpoints, GraphQL
/// paths) participate through the hooks carried in [`HttpState`].
pub fn build_router(state: HttpState, cors: Option<&CorsConfig>) -> Router {
    let mut router = Router::new()
        .route(&concat_reserved("/health"), get(health_handler))
        .route(&concat_reserved("/ready"), get(health_handler))
        .fallback(dispatch::dispatch_handler)
        .layer(axum::middleware::from_fn_with_state(
            std::sync::Arc::clone(&state.chaos),
            mockd_chaos::middleware::chaos_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::request_log_middleware,
        ));
    if let Some(cors) = cors {
        router = router.layer(cors.layer());
    }
    router
        // A panicking handler becomes a 500 and the server keeps serving;
        // sitting inside the metrics layer, the 500 is still recorded.
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::tracing_middleware,
        ))
        .with_state(state)
}

fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> http::Response<Body> {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("panic");
    tracing::error!(detail, "request handler panicked");
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"error":"internal","message":"internal server error"}"#,
        ))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

// The reserved paths are fixed strings; this keeps them next to the prefix.
fn concat_reserved(suffix: &str) -> String {
    format!("{RESERVED_PREFIX}{suffix}")
}

async fn health_handler() -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"status":"ok"}"#))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use mockd_chaos::ChaosInjector;
    use mockd_core::{MockRegistry, RequestLog, ResourceStore};
    use mockd_observability::MetricsRegistry;
    use std::sync::Arc;

    /// Fresh state for middleware unit tests
    pub(crate) fn test_state() -> HttpState {
        HttpState::new(
            Arc::new(MockRegistry::new()),
            Arc::new(ResourceStore::new()),
            Arc::new(RequestLog::new(100)),
            Arc::new(ChaosInjector::disabled()),
            MetricsRegistry::new(),
        )
    }
}
