//! Chaos middleware for the HTTP pipeline
//!
//! Runs the pre-response phase before dispatch and applies the write-phase
//! body plan to whatever the inner handler produced.

use crate::body::{reset_body, transform_body};
use crate::injector::{ChaosInjector, PreAction};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::StatusCode;
use std::sync::Arc;
use tracing::debug;

/// Axum middleware wrapping dispatch with both chaos phases
pub async fn chaos_middleware(
    State(injector): State<Arc<ChaosInjector>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let decision = injector.apply_pre(&method, &path).await;

    match decision.action {
        PreAction::Proceed => {
            let response = next.run(req).await;
            if decision.body_plan.is_noop() {
                return response;
            }
            let (parts, body) = response.into_parts();
            // Transforms invalidate any declared length.
            let mut parts = parts;
            parts.headers.remove(http::header::CONTENT_LENGTH);
            Response::from_parts(parts, transform_body(body, &decision.body_plan))
        }
        PreAction::Error(code) => {
            debug!(%path, code, "chaos error short-circuit");
            status_response(code)
        }
        PreAction::Timeout(duration) => {
            debug!(%path, ?duration, "chaos timeout hold");
            tokio::time::sleep(duration).await;
            status_response(StatusCode::GATEWAY_TIMEOUT.as_u16())
        }
        PreAction::Reset => {
            debug!(%path, "chaos connection reset");
            Response::builder()
                .status(StatusCode::OK)
                .body(reset_body())
                .unwrap_or_else(|_| status_response(500))
        }
    }
}

fn status_response(code: u16) -> Response {
    Response::builder()
        .status(StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .body(Body::empty())
        .unwrap_or_else(|_| {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChaosConfig, Fault, FaultList};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(config: ChaosConfig) -> Router {
        let injector = Arc::new(ChaosInjector::new(config).unwrap());
        Router::new()
            .route("/api/test", get(|| async { "payload" }))
            .layer(axum::middleware::from_fn_with_state(
                injector,
                chaos_middleware,
            ))
    }

    fn request() -> Request {
        Request::builder()
            .uri("/api/test")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn passthrough_when_disabled() {
        let response = app(ChaosConfig::default()).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn error_fault_short_circuits_with_code() {
        let config = ChaosConfig {
            enabled: true,
            global_rules: FaultList(vec![Fault::Error {
                probability: 1.0,
                default_code: Some(503),
                status_codes: vec![],
            }]),
            rules: vec![],
        };
        let response = app(config).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn latency_fault_preserves_response() {
        use crate::config::DurationMs;
        let config = ChaosConfig {
            enabled: true,
            global_rules: FaultList(vec![Fault::Latency {
                min: DurationMs(60),
                max: DurationMs(60),
                probability: 1.0,
            }]),
            rules: vec![],
        };
        let start = std::time::Instant::now();
        let response = app(config).oneshot(request()).await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(60));
        assert_eq!(response.status(), StatusCode::OK);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"payload");
    }

    #[tokio::test]
    async fn empty_response_fault_drops_body_not_status() {
        let config = ChaosConfig {
            enabled: true,
            global_rules: FaultList(vec![Fault::EmptyResponse { probability: 1.0 }]),
            rules: vec![],
        };
        let response = app(config).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert!(body.is_empty());
    }
}
