//! End-to-end tests for the HTTP pipeline

use mockd_chaos::{ChaosConfig, ChaosInjector};
use mockd_core::model::{
    HttpMatcher, HttpMock, HttpResponseSpec, IdMode, Mock, MockSpec, ResourceSpec,
};
use mockd_core::{LogQuery, MockRegistry, RequestLog, ResourceStore};
use mockd_http::{build_router, HttpState};
use mockd_observability::MetricsRegistry;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

struct Harness {
    addr: SocketAddr,
    registry: Arc<MockRegistry>,
    resources: Arc<ResourceStore>,
    request_log: Arc<RequestLog>,
    chaos: Arc<ChaosInjector>,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn start() -> Harness {
    start_with_chaos(ChaosConfig::default()).await
}

async fn start_with_chaos(chaos_config: ChaosConfig) -> Harness {
    let registry = Arc::new(MockRegistry::new());
    let resources = Arc::new(ResourceStore::new());
    let request_log = Arc::new(RequestLog::new(1000));
    let chaos = Arc::new(ChaosInjector::new(chaos_config).unwrap());
    let state = HttpState::new(
        Arc::clone(&registry),
        Arc::clone(&resources),
        Arc::clone(&request_log),
        Arc::clone(&chaos),
        MetricsRegistry::new(),
    );
    let router = build_router(state, None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Harness {
        addr,
        registry,
        resources,
        request_log,
        chaos,
    }
}

fn http_mock(method: &str, path: &str, status: u16, body: &str, priority: i32) -> Mock {
    Mock::new(MockSpec::Http(HttpMock {
        matcher: HttpMatcher {
            method: Some(method.to_string()),
            path: path.to_string(),
            ..HttpMatcher::default()
        },
        response: HttpResponseSpec {
            status_code: status,
            body: body.to_string(),
            ..HttpResponseSpec::default()
        },
        priority,
    }))
}

#[tokio::test(flavor = "multi_thread")]
async fn basic_mock_round_trip() {
    let harness = start().await;
    harness
        .registry
        .create(http_mock("GET", "/api/users", 200, "[]", 0))
        .unwrap();

    let response = reqwest::get(harness.url("/api/users")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "[]");
}

#[tokio::test(flavor = "multi_thread")]
async fn priority_tie_break_prefers_higher() {
    let harness = start().await;
    harness
        .registry
        .create(http_mock("GET", "/api/users", 200, "generic", 1))
        .unwrap();
    harness
        .registry
        .create(http_mock("GET", "/api/users", 200, "specific", 10))
        .unwrap();

    let body = reqwest::get(harness.url("/api/users"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "specific");
}

#[tokio::test(flavor = "multi_thread")]
async fn miss_returns_standard_404_body() {
    let harness = start().await;
    let response = reqwest::get(harness.url("/nothing/here")).await.unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["path"], "/nothing/here");
}

#[tokio::test(flavor = "multi_thread")]
async fn chaos_latency_delays_without_changing_response() {
    let chaos_config: ChaosConfig = serde_json::from_value(json!({
        "enabled": true,
        "globalRules": {
            "latency": {"min": "200ms", "max": "200ms", "probability": 1.0}
        }
    }))
    .unwrap();
    let harness = start_with_chaos(chaos_config).await;
    harness
        .registry
        .create(http_mock("GET", "/api/test", 200, "ok", 0))
        .unwrap();

    let start = std::time::Instant::now();
    let response = reqwest::get(harness.url("/api/test")).await.unwrap();
    assert!(start.elapsed() >= std::time::Duration::from_millis(200));
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
    assert!(harness.chaos.stats().latency_injected >= 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn stateful_resource_crud_flow() {
    let harness = start().await;
    harness
        .resources
        .register(ResourceSpec {
            name: "users".into(),
            base_path: "/api/users".into(),
            id_field: "id".into(),
            parent_field: None,
            seed: vec![json!({"id": "user-1", "name": "Bob"})],
            id_mode: IdMode::Uuid,
        })
        .unwrap();

    let client = reqwest::Client::new();
    let created: Value = client
        .post(harness.url("/api/users"))
        .json(&json!({"name": "Alice"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!created["id"].as_str().unwrap().is_empty());
    assert!(created["createdAt"].is_string());

    let listed: Value = client
        .get(harness.url("/api/users?sort=name&order=asc"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["meta"]["total"], 2);
    assert_eq!(listed["data"][0]["name"], "Alice");
    assert_eq!(listed["data"][1]["name"], "Bob");

    let deleted = client
        .delete(harness.url("/api/users/user-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let missing = client
        .get(harness.url("/api/users/user-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn matched_mock_wins_over_stateful_route() {
    let harness = start().await;
    harness
        .resources
        .register(ResourceSpec {
            name: "users".into(),
            base_path: "/api/users".into(),
            id_field: "id".into(),
            parent_field: None,
            seed: vec![],
            id_mode: IdMode::Uuid,
        })
        .unwrap();
    harness
        .registry
        .create(http_mock("GET", "/api/users", 200, "mocked", 0))
        .unwrap();

    let body = reqwest::get(harness.url("/api/users"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "mocked");
}

#[tokio::test(flavor = "multi_thread")]
async fn request_log_captures_hits_and_misses() {
    let harness = start().await;
    let created = harness
        .registry
        .create(http_mock("GET", "/api/users", 200, "[]", 0))
        .unwrap();

    reqwest::get(harness.url("/api/users")).await.unwrap();
    reqwest::get(harness.url("/missing")).await.unwrap();

    let entries = harness.request_log.list(&LogQuery::default());
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path, "/missing");
    assert_eq!(entries[0].status, 404);
    assert!(entries[0].matched_mock.is_empty());
    assert_eq!(entries[1].matched_mock, created.id);
    assert_eq!(entries[1].response_body.as_deref(), Some("[]"));
}

#[tokio::test(flavor = "multi_thread")]
async fn config_replace_swaps_visible_mocks() {
    let harness = start().await;
    harness
        .registry
        .create(http_mock("GET", "/api/old", 200, "old", 0))
        .unwrap();

    harness
        .registry
        .replace_all(vec![http_mock("GET", "/api/new", 200, "new", 0)])
        .unwrap();

    let old = reqwest::get(harness.url("/api/old")).await.unwrap();
    assert_eq!(old.status(), 404);
    let new = reqwest::get(harness.url("/api/new")).await.unwrap();
    assert_eq!(new.status(), 200);
}

#[tokio::test(flavor = "multi_thread")]
async fn templated_responses_differ_per_request() {
    let harness = start().await;
    harness
        .registry
        .create(http_mock(
            "GET",
            "/api/token",
            200,
            r#"{"id":"{{uuid}}","at":"{{now}}"}"#,
            0,
        ))
        .unwrap();

    let first: Value = reqwest::get(harness.url("/api/token")).await.unwrap().json().await.unwrap();
    let second: Value = reqwest::get(harness.url("/api/token")).await.unwrap().json().await.unwrap();
    assert_ne!(first["id"], second["id"]);
    assert!(!first["id"].as_str().unwrap().contains("{{"));
}

#[tokio::test(flavor = "multi_thread")]
async fn path_params_flow_into_templates() {
    let harness = start().await;
    let mut mock = http_mock("GET", "/api/users/:id", 200, r#"{"id":"{{params.id}}"}"#, 0);
    if let MockSpec::Http(http) = &mut mock.spec {
        http.matcher.method = Some("GET".into());
    }
    harness.registry.create(mock).unwrap();

    let body: Value = reqwest::get(harness.url("/api/users/42"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["id"], "42");
}

#[tokio::test(flavor = "multi_thread")]
async fn header_and_query_conditions_filter_requests() {
    let harness = start().await;
    let mut mock = http_mock("GET", "/api/data", 200, "tenant", 0);
    if let MockSpec::Http(http) = &mut mock.spec {
        http.matcher.headers = HashMap::from([("X-Tenant".to_string(), "acme".to_string())]);
        http.matcher.query = HashMap::from([("page".to_string(), "1".to_string())]);
    }
    harness.registry.create(mock).unwrap();

    let client = reqwest::Client::new();
    let hit = client
        .get(harness.url("/api/data?page=1"))
        .header("x-tenant", "acme")
        .send()
        .await
        .unwrap();
    assert_eq!(hit.status(), 200);

    let no_header = client.get(harness.url("/api/data?page=1")).send().await.unwrap();
    assert_eq!(no_header.status(), 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn reserved_health_endpoints_respond() {
    let harness = start().await;
    let response = reqwest::get(harness.url("/__mockd/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    let response = reqwest::get(harness.url("/__mockd/ready")).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test(flavor = "multi_thread")]
async fn sse_mock_streams_events() {
    let harness = start().await;
    let mut mock = http_mock("GET", "/api/stream", 200, "", 0);
    if let MockSpec::Http(http) = &mut mock.spec {
        http.response.events = Some(vec![
            mockd_core::model::SseEvent {
                event: Some("tick".into()),
                data: "one".into(),
                id: None,
                delay_ms: 10,
            },
            mockd_core::model::SseEvent {
                event: Some("tick".into()),
                data: "two".into(),
                id: None,
                delay_ms: 10,
            },
        ]);
    }
    harness.registry.create(mock).unwrap();

    let response = reqwest::get(harness.url("/api/stream")).await.unwrap();
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    let text = response.text().await.unwrap();
    assert!(text.contains("data: one"));
    assert!(text.contains("data: two"));
}
