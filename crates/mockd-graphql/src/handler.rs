//! GraphQL request handling on the traffic port
//!
//! A dispatcher keeps one executable schema per configured endpoint path and
//! plugs into the HTTP dispatch chain as a hook: POSTs to a registered path
//! execute against that schema, everything else falls through to the mock
//! matcher.

use crate::schema::build_schema;
use async_graphql::dynamic::Schema;
use async_graphql::Variables;
use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::response::Response;
use http::{Method, StatusCode};
use mockd_core::model::MockSpec;
use mockd_core::RegistrySnapshot;
use mockd_http::RouteHook;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_QUERY_BYTES: usize = 1024 * 1024;

/// Wire shape of a GraphQL POST body
#[derive(Debug, Deserialize)]
struct GraphqlRequestBody {
    query: String,
    #[serde(rename = "operationName")]
    operation_name: Option<String>,
    #[serde(default)]
    variables: Option<Value>,
}

struct GraphqlRuntime {
    schema: Schema,
}

/// Keeps the executable schemas for all configured GraphQL endpoints
#[derive(Default)]
pub struct GraphqlDispatcher {
    endpoints: RwLock<HashMap<String, Arc<GraphqlRuntime>>>,
}

impl GraphqlDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reconcile endpoint schemas with a registry snapshot
    ///
    /// Endpoints whose SDL fails to build are logged and skipped; the rest
    /// of the sync still applies.
    pub fn sync(&self, snapshot: &RegistrySnapshot) {
        let mut next: HashMap<String, Arc<GraphqlRuntime>> = HashMap::new();
        for mock in snapshot.mocks() {
            if !mock.is_enabled() {
                continue;
            }
            let MockSpec::Graphql(endpoint) = &mock.spec else {
                continue;
            };
            match build_schema(endpoint) {
                Ok(schema) => {
                    next.insert(endpoint.path.clone(), Arc::new(GraphqlRuntime { schema }));
                }
                Err(e) => {
                    warn!(mock_id = %mock.id, error = %e, "graphql schema rejected");
                }
            }
        }
        *self.endpoints.write() = next;
    }

    async fn handle(&self, req: Request) -> Result<Response, Request> {
        let path = req.uri().path().to_string();
        let Some(runtime) = self.endpoints.read().get(&path).cloned() else {
            return Err(req);
        };
        if req.method() != Method::POST {
            return Err(req);
        }

        let (_parts, body) = req.into_parts();
        let bytes = match to_bytes(body, MAX_QUERY_BYTES).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return Ok(error_response(
                    StatusCode::BAD_REQUEST,
                    "request body too large",
                ));
            }
        };

        let parsed: GraphqlRequestBody = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Ok(error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("invalid request body: {e}"),
                ));
            }
        };
        debug!(%path, operation = parsed.operation_name.as_deref().unwrap_or(""), "graphql request");

        let mut request = async_graphql::Request::new(parsed.query);
        if let Some(operation_name) = parsed.operation_name {
            request = request.operation_name(operation_name);
        }
        if let Some(variables) = parsed.variables {
            request = request.variables(Variables::from_json(variables));
        }

        let response = runtime.schema.execute(request).await;
        let body = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"errors":[{"message":"serialization failed"}]}"#.to_string());
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap_or_else(|_| Response::new(Body::empty())))
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = json!({"errors": [{"message": message}]});
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// The hook plugged into the HTTP dispatch chain
pub struct GraphqlHook(pub Arc<GraphqlDispatcher>);

impl RouteHook for GraphqlHook {
    fn try_handle(
        &self,
        req: Request,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Response, Request>> + Send + '_>,
    > {
        Box::pin(async move { self.0.handle(req).await })
    }
}
