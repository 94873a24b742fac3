//! Dynamic route hooks
//!
//! Protocol adapters that live on the traffic port (WebSocket endpoints,
//! GraphQL paths) register a hook. Dispatch offers each request to the hooks
//! before the matcher runs; a hook that declines hands the request back
//! untouched, upgrade extension included. Hooks keep their own endpoint
//! tables, so registry changes take effect without rebuilding the router.

use axum::extract::Request;
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;

/// A handler consulted ahead of mock dispatch
pub trait RouteHook: Send + Sync {
    /// Handle the request or give it back
    fn try_handle(
        &self,
        req: Request,
    ) -> Pin<Box<dyn Future<Output = Result<Response, Request>> + Send + '_>>;
}
