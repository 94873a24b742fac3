//! # mockd observability
//!
//! Prometheus metrics, structured logging setup, and W3C trace-context
//! propagation for the mockd platform. Protocol crates record into the
//! shared [`MetricsRegistry`]; the admin plane serves its text exposition.

pub mod logging;
pub mod metrics;
pub mod trace;

pub use logging::init_logging;
pub use metrics::{global_metrics, MetricsRegistry};
pub use trace::{context_for_request, TraceParent, TRACEPARENT_HEADER};
