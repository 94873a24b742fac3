//! Dispatch: matcher, then stateful resources, then 404
//!
//! The fallback handler of the traffic router. Exactly one response path
//! fires per request: a matched mock, a stateful-resource handler, or the
//! standard miss body.

use crate::middleware::request_logging::{MatchedMock, ResponseSnapshot, MAX_BUFFERED_BODY};
use crate::state::HttpState;
use crate::{render, resources};
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::response::Response;
use http::StatusCode;
use mockd_core::model::MockSpec;
use mockd_core::template::RenderContext;
use mockd_core::RequestFacts;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

/// Fallback handler for every non-reserved traffic path
pub async fn dispatch_handler(State(state): State<HttpState>, req: Request) -> Response {
    // Protocol hooks (WebSocket upgrades, GraphQL paths) get first refusal
    // with the request intact.
    let mut req = req;
    for hook in state.hooks.iter() {
        req = match hook.try_handle(req).await {
            Ok(response) => return response,
            Err(req) => req,
        };
    }

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = parse_query(req.uri().query());
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
    let body_bytes = to_bytes(req.into_body(), MAX_BUFFERED_BODY)
        .await
        .unwrap_or_default();
    let body_text = String::from_utf8_lossy(&body_bytes).to_string();

    let snapshot = state.registry.snapshot();
    let facts = RequestFacts {
        method: &method,
        path: &path,
        headers: &headers,
        query: &query,
        body: (!body_text.is_empty()).then_some(body_text.as_str()),
    };

    if let Some(result) = snapshot.http_index().select(&facts) {
        debug!(mock_id = %result.mock.id, %path, "request matched mock");
        state.metrics.match_hits_total.inc();
        let MockSpec::Http(http) = &result.mock.spec else {
            // The index only holds HTTP mocks.
            return miss_response(&state, &path);
        };
        let ctx = RenderContext::with_params(result.params);
        let (mut response, rendered) = render::render(&http.response, &ctx).await;
        response
            .extensions_mut()
            .insert(MatchedMock(result.mock.id.clone()));
        if let Some(rendered) = rendered {
            response.extensions_mut().insert(ResponseSnapshot(rendered));
        }
        return response;
    }

    if let Some(route) = state.resources.route(&path) {
        debug!(resource = %route.resource, %path, "request handled by stateful resource");
        return resources::handle(&state, &method, &route, &query, &body_bytes).await;
    }

    state.metrics.match_misses_total.inc();
    miss_response(&state, &path)
}

fn miss_response(_state: &HttpState, path: &str) -> Response {
    let body = json!({
        "error": "not_found",
        "message": "no mock matched",
        "path": path,
    });
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Decode a raw query string into a map (first value wins)
pub fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(raw) = raw else {
        return out;
    };
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key).map(|s| s.into_owned()).unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| value.to_string());
        out.entry(key).or_insert(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parsing_decodes_and_keeps_first() {
        let parsed = parse_query(Some("a=1&b=hello%20world&a=2&flag"));
        assert_eq!(parsed.get("a").map(String::as_str), Some("1"));
        assert_eq!(parsed.get("b").map(String::as_str), Some("hello world"));
        assert_eq!(parsed.get("flag").map(String::as_str), Some(""));
        assert!(parse_query(None).is_empty());
    }
}
