//! # mockd chaos
//!
//! Fault injection for the mockd platform. A [`ChaosInjector`] evaluates the
//! active configuration at two points per request: before the response is
//! produced (latency, error short-circuit, timeout, connection reset) and
//! while it is written (truncation, corruption, throttling). Configuration
//! swaps are atomic; counters are lock-free.
//!
//! The HTTP pipeline consumes this crate through [`middleware::chaos_middleware`];
//! other transports call [`ChaosInjector::apply_pre`] directly.

pub mod body;
pub mod config;
pub mod injector;
pub mod middleware;

pub use body::{reset_body, transform_body};
pub use config::{ChaosConfig, ChaosRule, DurationMs, Fault, FaultList};
pub use injector::{BodyPlan, ChaosInjector, ChaosStats, PreAction, PreDecision};
