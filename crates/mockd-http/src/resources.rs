//! REST surface over the stateful resource engine
//!
//! Standard collection semantics at each registered base path: paginated
//! list with filters, item CRUD, nested parents, server-side timestamps.

use crate::state::HttpState;
use axum::body::Body;
use axum::response::Response;
use http::StatusCode;
use mockd_core::resources::{ListParams, ResourceRoute};
use mockd_core::Error;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Handle a request that landed on a registered resource path
pub async fn handle(
    state: &HttpState,
    method: &str,
    route: &ResourceRoute,
    query: &HashMap<String, String>,
    body: &[u8],
) -> Response {
    let result = match (method, &route.id) {
        ("GET", None) => list(state, route, query),
        ("GET", Some(id)) => state
            .resources
            .get(&route.resource, id, route.parent.as_deref())
            .map(|item| json_response(StatusCode::OK, &item)),
        ("POST", None) => parse_body(body).and_then(|payload| {
            state
                .resources
                .create(&route.resource, payload, route.parent.as_deref())
                .map(|item| json_response(StatusCode::CREATED, &item))
        }),
        ("PUT", Some(id)) => parse_body(body).and_then(|payload| {
            state
                .resources
                .put(&route.resource, id, payload)
                .map(|item| json_response(StatusCode::OK, &item))
        }),
        ("PATCH", Some(id)) => parse_body(body).and_then(|payload| {
            state
                .resources
                .patch(&route.resource, id, payload)
                .map(|item| json_response(StatusCode::OK, &item))
        }),
        ("DELETE", Some(id)) => state
            .resources
            .delete(&route.resource, id)
            .map(|()| empty_response(StatusCode::NO_CONTENT)),
        _ => Err(Error::MethodNotAllowed),
    };
    result.unwrap_or_else(|e| error_response(&e))
}

fn list(
    state: &HttpState,
    route: &ResourceRoute,
    query: &HashMap<String, String>,
) -> Result<Response, Error> {
    let params = ListParams::from_query(query);
    let page = state
        .resources
        .list(&route.resource, &params, route.parent.as_deref())?;
    Ok(json_response(StatusCode::OK, &page))
}

fn parse_body(body: &[u8]) -> Result<Value, Error> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|e| Error::InvalidJson {
        message: e.to_string(),
    })
}

fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Response {
    let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn empty_response(status: StatusCode) -> Response {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn error_response(error: &Error) -> Response {
    let body = json!({
        "error": error.code(),
        "message": error.to_string(),
    });
    Response::builder()
        .status(StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}
