//! Request-log middleware
//!
//! Buffers the (small) request body, times the dispatch, and records an
//! entry in the ring buffer. The write path never blocks: the ring is a
//! short mutex and the entry is built after the response exists.

use crate::state::HttpState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use mockd_core::request_log::{new_entry, BODY_SNAPSHOT_CAP};
use std::collections::HashMap;
use std::time::Instant;

/// Largest request body the pipeline will buffer
pub const MAX_BUFFERED_BODY: usize = 2 * 1024 * 1024;

/// Mock id attached to the response by the dispatch handler
#[derive(Debug, Clone)]
pub struct MatchedMock(pub String);

/// Bounded response body snapshot attached by the dispatch handler
#[derive(Debug, Clone)]
pub struct ResponseSnapshot(pub String);

/// Axum middleware recording every request into the ring buffer
pub async fn request_log_middleware(
    State(state): State<HttpState>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    // Buffer the body so both the log and the matcher can read it; parts
    // (including the upgrade extension) pass through untouched.
    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_BUFFERED_BODY).await.unwrap_or_default();
    let body_snapshot = (!bytes.is_empty())
        .then(|| String::from_utf8_lossy(&bytes[..bytes.len().min(BODY_SNAPSHOT_CAP)]).to_string());
    let req = Request::from_parts(parts, Body::from(bytes));

    let response = next.run(req).await;

    let mut entry = new_entry(&method, &path);
    entry.headers = headers;
    entry.body = body_snapshot;
    entry.status = response.status().as_u16();
    entry.duration_ms = start.elapsed().as_millis() as u64;
    if let Some(MatchedMock(id)) = response.extensions().get::<MatchedMock>() {
        entry.matched_mock = id.clone();
    }
    if let Some(ResponseSnapshot(snapshot)) = response.extensions().get::<ResponseSnapshot>() {
        entry.response_body = Some(snapshot.clone());
    }
    state.request_log.push(entry);

    response
}
