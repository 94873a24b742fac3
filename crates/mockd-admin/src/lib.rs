//! # mockd admin
//!
//! The admin control plane: mock CRUD and toggles, configuration
//! import/export, request-log queries, state reset and overview, chaos
//! configuration and stats, WebSocket connection administration, health,
//! and Prometheus metrics. Runs on its own port; the same router without an
//! API key serves as the engine-local control port.

pub mod api;
pub mod auth;
pub mod envelope;
pub mod state;

pub use api::admin_router;
pub use envelope::{ApiError, ApiResult, ErrorEnvelope};
pub use state::AdminState;
