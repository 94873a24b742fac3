//! Structured logging setup

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable controlling the log filter
pub const LOG_ENV: &str = "MOCKD_LOG";

/// Initialize the process-wide tracing subscriber
///
/// The filter comes from `MOCKD_LOG` when set, falling back to the given
/// default (e.g. `"info"`). Safe to call more than once; later calls are
/// no-ops.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
