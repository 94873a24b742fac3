//! The traffic-port middleware chain
//!
//! Composition order, outermost first: tracing, metrics, CORS, request log,
//! chaos. Every layer is an `axum::middleware::from_fn` wrapper so the
//! upgrade extension on WebSocket requests passes through untouched.

pub mod metrics;
pub mod request_logging;
pub mod tracing_mw;

pub use metrics::{metrics_middleware, normalize_path};
pub use request_logging::{request_log_middleware, MatchedMock, ResponseSnapshot};
pub use tracing_mw::tracing_middleware;
