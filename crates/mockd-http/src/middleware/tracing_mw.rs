//! Tracing middleware
//!
//! Reads the W3C `traceparent` header, runs the request inside a span with
//! the standard HTTP attributes, and emits a child `traceparent` on the
//! response. Paths in the configurable skip-set are passed through untouched.

use crate::state::HttpState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::HeaderValue;
use mockd_observability::{context_for_request, TRACEPARENT_HEADER};
use tracing::Instrument;

/// Axum middleware creating one span per traced request
pub async fn tracing_middleware(
    State(state): State<HttpState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if state.skip_tracing(&path) {
        return next.run(req).await;
    }

    let incoming = req
        .headers()
        .get(TRACEPARENT_HEADER)
        .and_then(|v| v.to_str().ok());
    let ctx = context_for_request(incoming);
    let method = req.method().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        http.method = %method,
        http.target = %path,
        http.status_code = tracing::field::Empty,
    );

    let mut response = async {
        let response = next.run(req).await;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        response
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&ctx.to_header_value()) {
        response.headers_mut().insert(TRACEPARENT_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = test_state();
        Router::new()
            .route("/test", get(|| async { "ok" }))
            .route("/health", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                tracing_middleware,
            ))
    }

    #[tokio::test]
    async fn traced_response_carries_traceparent() {
        let response = app()
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key(TRACEPARENT_HEADER));
    }

    #[tokio::test]
    async fn trace_id_is_propagated_from_caller() {
        let incoming = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header(TRACEPARENT_HEADER, incoming)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let value = response
            .headers()
            .get(TRACEPARENT_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(value.contains("0af7651916cd43dd8448eb211c80319c"));
        assert!(!value.contains("b7ad6b7169203331"));
    }

    #[tokio::test]
    async fn skip_set_paths_are_not_traced() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(!response.headers().contains_key(TRACEPARENT_HEADER));
    }
}
