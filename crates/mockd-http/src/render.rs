//! Response rendering
//!
//! Turns a matched mock's response spec into bytes. Bodies and header values
//! are template-expanded fresh per request; a declared delay is honored
//! before the first byte; SSE responses stream their events at the
//! configured cadence.

use axum::body::Body;
use axum::response::Response;
use futures::StreamExt;
use http::{HeaderName, HeaderValue, StatusCode};
use mockd_core::model::{HttpResponseSpec, SseEvent};
use mockd_core::template::{render_str, RenderContext};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

/// Render a response spec
///
/// Returns the response plus a bounded body snapshot for the request log
/// (absent for event streams).
pub async fn render(spec: &HttpResponseSpec, ctx: &RenderContext) -> (Response, Option<String>) {
    if let Some(delay) = spec.delay_ms {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if let Some(events) = &spec.events {
        return (render_sse(spec, events.clone(), ctx.clone()), None);
    }

    let body = render_str(&spec.body, ctx);
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(spec.status_code).unwrap_or(StatusCode::OK));
    for (name, value) in &spec.headers {
        let rendered = render_str(value, ctx);
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(&rendered),
        ) {
            builder = builder.header(name, value);
        }
    }
    let response = builder
        .body(Body::from(body.clone()))
        .unwrap_or_else(|_| Response::new(Body::empty()));
    (response, Some(body))
}

fn render_sse(spec: &HttpResponseSpec, events: Vec<SseEvent>, ctx: RenderContext) -> Response {
    let ctx = Arc::new(ctx);
    let stream = futures::stream::iter(events).then(move |event| {
        let ctx = Arc::clone(&ctx);
        async move {
            if event.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(event.delay_ms)).await;
            }
            Ok::<_, Infallible>(format_event(&event, &ctx))
        }
    });

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(spec.status_code).unwrap_or(StatusCode::OK))
        .header(http::header::CONTENT_TYPE, "text/event-stream")
        .header(http::header::CACHE_CONTROL, "no-cache");
    for (name, value) in &spec.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn format_event(event: &SseEvent, ctx: &RenderContext) -> String {
    let mut out = String::new();
    if let Some(name) = &event.event {
        out.push_str("event: ");
        out.push_str(&render_str(name, ctx));
        out.push('\n');
    }
    if let Some(id) = &event.id {
        out.push_str("id: ");
        out.push_str(&render_str(id, ctx));
        out.push('\n');
    }
    for line in render_str(&event.data, ctx).lines() {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::collections::HashMap;

    #[tokio::test]
    async fn plain_body_and_headers_are_templated() {
        let spec = HttpResponseSpec {
            status_code: 201,
            headers: HashMap::from([("X-Request-Id".to_string(), "{{uuid}}".to_string())]),
            body: r#"{"id":"{{params.id}}"}"#.to_string(),
            delay_ms: None,
            events: None,
        };
        let ctx = RenderContext::with_params(HashMap::from([(
            "id".to_string(),
            "42".to_string(),
        )]));
        let (response, snapshot) = render(&spec, &ctx).await;
        assert_eq!(response.status(), 201);
        let header = response.headers().get("x-request-id").unwrap().to_str().unwrap();
        assert_eq!(header.len(), 36);
        assert_eq!(snapshot.as_deref(), Some(r#"{"id":"42"}"#));
    }

    #[tokio::test]
    async fn delay_holds_the_first_byte() {
        let spec = HttpResponseSpec {
            delay_ms: Some(50),
            body: "late".into(),
            ..HttpResponseSpec::default()
        };
        let start = std::time::Instant::now();
        let (response, _) = render(&spec, &RenderContext::default()).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"late");
    }

    #[tokio::test]
    async fn sse_formats_events_with_cadence() {
        let spec = HttpResponseSpec {
            events: Some(vec![
                SseEvent {
                    event: Some("tick".into()),
                    data: "one".into(),
                    id: Some("1".into()),
                    delay_ms: 10,
                },
                SseEvent {
                    event: None,
                    data: "two\nlines".into(),
                    id: None,
                    delay_ms: 10,
                },
            ]),
            ..HttpResponseSpec::default()
        };
        let (response, snapshot) = render(&spec, &RenderContext::default()).await;
        assert!(snapshot.is_none());
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("event: tick\nid: 1\ndata: one\n\n"));
        assert!(text.contains("data: two\ndata: lines\n\n"));
    }
}
