//! Request metrics middleware
//!
//! Captures status and duration for every request and normalizes
//! high-cardinality path segments before they become label values.

use crate::state::HttpState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid segment regex")
});

/// Collapse unbounded path segments into placeholder labels
pub fn normalize_path(path: &str) -> String {
    let mut out = String::new();
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        out.push('/');
        if UUID_SEGMENT.is_match(segment) {
            out.push_str("{uuid}");
        } else if segment.bytes().all(|b| b.is_ascii_digit()) {
            out.push_str("{id}");
        } else if segment.len() >= 24 && segment.bytes().all(|b| b.is_ascii_hexdigit()) {
            out.push_str("{hex}");
        } else {
            out.push_str(segment);
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Axum middleware recording `mockd_requests_total` and the duration histogram
pub async fn metrics_middleware(
    State(state): State<HttpState>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    state.metrics.record_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_replaces_unbounded_segments() {
        assert_eq!(
            normalize_path("/api/users/550e8400-e29b-41d4-a716-446655440000"),
            "/api/users/{uuid}"
        );
        assert_eq!(normalize_path("/api/users/123456"), "/api/users/{id}");
        assert_eq!(
            normalize_path("/blobs/deadbeefdeadbeefdeadbeefdeadbeef"),
            "/blobs/{hex}"
        );
        assert_eq!(normalize_path("/api/users"), "/api/users");
        assert_eq!(normalize_path("/"), "/");
    }
}
