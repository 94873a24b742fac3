//! API-key gate
//!
//! A single shared key checked on every admin request, via either
//! `Authorization: Bearer <key>` or `X-Api-Key`. Health and metrics stay
//! reachable for probes and scrapers; the gate is disabled entirely when no
//! key is configured.

use crate::state::AdminState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;

const EXEMPT_PATHS: &[&str] = &["/health", "/metrics"];

/// Axum middleware enforcing the configured API key
pub async fn auth_middleware(
    State(state): State<AdminState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.api_key else {
        return next.run(req).await;
    };
    if EXEMPT_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let presented = bearer_token(&req).or_else(|| header_value(&req, "x-api-key"));
    let authorized = presented.is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()));
    if authorized {
        next.run(req).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "unauthorized",
                "message": "missing or invalid API key",
            })),
        )
            .into_response()
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    header_value(req, "authorization")?
        .strip_prefix("Bearer ")
        .map(ToString::to_string)
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
