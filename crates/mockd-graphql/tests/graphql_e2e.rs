//! End-to-end tests for the GraphQL adapter

use mockd_chaos::ChaosInjector;
use mockd_core::model::{
    GraphqlEndpoint, GraphqlErrorMock, GraphqlResolver, Mock, MockSpec,
};
use mockd_core::{MockRegistry, RegistryEvent, RegistryListener, RequestLog, ResourceStore};
use mockd_graphql::{GraphqlDispatcher, GraphqlHook};
use mockd_http::{build_router, HttpState};
use mockd_observability::MetricsRegistry;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

const SDL: &str = r#"
type User {
  id: ID!
  name: String!
  email: String!
}

type Query {
  user(id: ID!): User
  version: String!
}
"#;

struct Harness {
    addr: SocketAddr,
    registry: Arc<MockRegistry>,
}

struct SyncListener {
    registry: Arc<MockRegistry>,
    dispatcher: Arc<GraphqlDispatcher>,
}

impl RegistryListener for SyncListener {
    fn on_event(&self, _event: &RegistryEvent) {
        self.dispatcher.sync(&self.registry.snapshot());
    }
}

async fn start() -> Harness {
    let registry = Arc::new(MockRegistry::new());
    let dispatcher = GraphqlDispatcher::new();
    registry.subscribe(Arc::new(SyncListener {
        registry: Arc::clone(&registry),
        dispatcher: Arc::clone(&dispatcher),
    }));

    let state = HttpState::new(
        Arc::clone(&registry),
        Arc::new(ResourceStore::new()),
        Arc::new(RequestLog::new(100)),
        Arc::new(ChaosInjector::disabled()),
        MetricsRegistry::new(),
    )
    .with_hooks(vec![Arc::new(GraphqlHook(dispatcher))]);

    let router = build_router(state, None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Harness { addr, registry }
}

fn endpoint(resolvers: HashMap<String, GraphqlResolver>, introspection: bool) -> Mock {
    Mock::new(MockSpec::Graphql(GraphqlEndpoint {
        path: "/graphql".into(),
        schema: SDL.into(),
        introspection,
        resolvers,
    }))
}

async fn query(harness: &Harness, body: Value) -> Value {
    reqwest::Client::new()
        .post(format!("http://{}/graphql", harness.addr))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_resolver_renders_args() {
    let mut resolvers = HashMap::new();
    resolvers.insert(
        "Query.user".to_string(),
        GraphqlResolver {
            response: Some(json!({
                "id": "{{args.id}}",
                "name": "Mock User",
                "email": "user-{{args.id}}@example.com"
            })),
            error: None,
        },
    );
    let harness = start().await;
    harness.registry.create(endpoint(resolvers, false)).unwrap();

    let body = query(
        &harness,
        json!({"query": r#"{ user(id: "42") { id name email } }"#}),
    )
    .await;
    assert_eq!(body["data"]["user"]["id"], "42");
    assert_eq!(body["data"]["user"]["name"], "Mock User");
    assert_eq!(body["data"]["user"]["email"], "user-42@example.com");
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_error_lands_in_errors_array() {
    let mut resolvers = HashMap::new();
    resolvers.insert(
        "Query.user".to_string(),
        GraphqlResolver {
            response: None,
            error: Some(GraphqlErrorMock {
                message: "user service down".into(),
                extensions: Some(json!({"code": "UNAVAILABLE"})),
            }),
        },
    );
    let harness = start().await;
    harness.registry.create(endpoint(resolvers, false)).unwrap();

    let body = query(&harness, json!({"query": r#"{ user(id: "1") { id } }"#})).await;
    assert_eq!(body["data"]["user"], Value::Null);
    assert_eq!(body["errors"][0]["message"], "user service down");
    assert_eq!(body["errors"][0]["extensions"]["code"], "UNAVAILABLE");
}

#[tokio::test(flavor = "multi_thread")]
async fn unconfigured_leaves_are_synthesized() {
    let harness = start().await;
    harness.registry.create(endpoint(HashMap::new(), false)).unwrap();

    let body = query(&harness, json!({"query": "{ version }"})).await;
    let version = body["data"]["version"].as_str().unwrap();
    assert!(!version.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn introspection_gated_by_flag() {
    let harness = start().await;
    let created = harness.registry.create(endpoint(HashMap::new(), false)).unwrap();

    let body = query(
        &harness,
        json!({"query": "{ __schema { queryType { name } } }"}),
    )
    .await;
    assert!(body["errors"].is_array(), "introspection should be rejected");

    let mut enabled = (*created).clone();
    if let MockSpec::Graphql(e) = &mut enabled.spec {
        e.introspection = true;
    }
    harness.registry.update(&created.id, enabled).unwrap();

    let body = query(
        &harness,
        json!({"query": "{ __schema { queryType { name } } }"}),
    )
    .await;
    assert_eq!(body["data"]["__schema"]["queryType"]["name"], "Query");
}

#[tokio::test(flavor = "multi_thread")]
async fn operation_name_selects_among_multiple() {
    let mut resolvers = HashMap::new();
    resolvers.insert(
        "Query.version".to_string(),
        GraphqlResolver {
            response: Some(json!("v1.2.3")),
            error: None,
        },
    );
    let harness = start().await;
    harness.registry.create(endpoint(resolvers, false)).unwrap();

    let document = r#"
        query GetVersion { version }
        query GetUser { user(id: "1") { id } }
    "#;

    let body = query(
        &harness,
        json!({"query": document, "operationName": "GetVersion"}),
    )
    .await;
    assert_eq!(body["data"]["version"], "v1.2.3");

    // No operationName with multiple operations is an error.
    let body = query(&harness, json!({"query": document})).await;
    assert!(body["errors"].is_array());
}

#[tokio::test(flavor = "multi_thread")]
async fn non_graphql_paths_fall_through_to_dispatch() {
    let harness = start().await;
    harness.registry.create(endpoint(HashMap::new(), false)).unwrap();

    let response = reqwest::get(format!("http://{}/other", harness.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
