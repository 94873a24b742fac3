//! Admin HTTP API
//!
//! JSON endpoints over the registry, stateful resources, request log, chaos
//! injector, and WebSocket manager. Errors render as the standard envelope;
//! the whole router sits behind the API-key gate.

use crate::auth::auth_middleware;
use crate::envelope::{ApiError, ApiResult};
use crate::state::AdminState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use http::{header, StatusCode};
use mockd_core::collection::MockCollection;
use mockd_core::registry::ListFilter;
use mockd_core::{Error, LogQuery, Mock, MockKind};
use mockd_import::Format;
use mockd_ws::Outbound;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

/// Build the admin router
pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/mocks", get(list_mocks).post(create_mock))
        .route(
            "/mocks/{id}",
            get(get_mock).put(put_mock).delete(delete_mock),
        )
        .route("/mocks/{id}/toggle", post(toggle_mock))
        .route("/config", get(export_config).post(import_config))
        .route("/state", get(state_overview))
        .route("/state/reset", post(state_reset))
        .route("/requests", get(list_requests).delete(clear_requests))
        .route("/requests/{id}", get(get_request))
        .route("/chaos", get(get_chaos).put(update_chaos).post(update_chaos))
        .route("/chaos/stats", get(chaos_stats))
        .route("/chaos/stats/reset", post(reset_chaos_stats))
        .route("/ws/connections", get(ws_connections))
        .route("/ws/connections/{id}", delete(ws_disconnect))
        .route("/ws/connections/{id}/send", post(ws_send))
        .route(
            "/ws/connections/{id}/groups/{group}",
            post(ws_join_group).delete(ws_leave_group),
        )
        .route("/ws/broadcast", post(ws_broadcast))
        .route("/ws/stats", get(ws_stats))
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}

fn parse_json<T: serde::de::DeserializeOwned>(bytes: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(bytes).map_err(|e| ApiError::invalid_json(e.to_string()))
}

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

async fn list_mocks(
    State(state): State<AdminState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<Mock>>> {
    let mut filter = ListFilter::default();
    if let Some(enabled) = params.get("enabled") {
        filter.enabled = Some(enabled == "true");
    }
    if let Some(kind) = params.get("type") {
        filter.kind = Some(kind.parse::<MockKind>()?);
    }
    let mocks = state.registry.list(&filter).iter().map(|m| (**m).clone()).collect();
    Ok(Json(mocks))
}

async fn create_mock(State(state): State<AdminState>, bytes: Bytes) -> ApiResult<Response> {
    let mock: Mock = parse_json(&bytes)?;
    let created = state.registry.create(mock)?;
    info!(id = %created.id, "mock created via admin");
    Ok((StatusCode::CREATED, Json((*created).clone())).into_response())
}

async fn get_mock(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Mock>> {
    state
        .registry
        .get(&id)
        .map(|mock| Json((*mock).clone()))
        .ok_or_else(|| Error::not_found(format!("mock '{id}'")).into())
}

async fn put_mock(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    bytes: Bytes,
) -> ApiResult<Json<Mock>> {
    let mock: Mock = parse_json(&bytes)?;
    Ok(Json((*state.registry.update(&id, mock)?).clone()))
}

async fn delete_mock(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.registry.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ToggleBody {
    enabled: bool,
}

async fn toggle_mock(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    bytes: Bytes,
) -> ApiResult<Json<Mock>> {
    let body: ToggleBody = parse_json(&bytes)?;
    Ok(Json((*state.registry.toggle(&id, body.enabled)?).clone()))
}

// ---------------------------------------------------------------------------
// Config import/export
// ---------------------------------------------------------------------------

async fn export_config(
    State(state): State<AdminState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    let name = params.get("name").cloned().unwrap_or_else(|| "mockd-export".into());
    let format = match params.get("format") {
        Some(name) => Format::from_name(name)
            .ok_or_else(|| ApiError::validation(format!("unknown format '{name}'")))?,
        None => Format::Mockd,
    };

    let mut collection = MockCollection::new(&name);
    collection.mocks = state
        .registry
        .list(&ListFilter::default())
        .iter()
        .map(|m| (**m).clone())
        .collect();
    collection.stateful_resources = state.resources.specs();

    let (content, content_type) = mockd_import::export(&collection, format)?;
    Ok(([(header::CONTENT_TYPE, content_type)], content).into_response())
}

#[derive(Deserialize)]
struct ImportBody {
    #[serde(default)]
    replace: bool,
    config: Value,
}

async fn import_config(State(state): State<AdminState>, bytes: Bytes) -> ApiResult<Json<Value>> {
    let body: ImportBody = parse_json(&bytes)?;
    let collection = mockd_import::import_value(&body.config)?;
    collection.validate()?;

    for spec in &collection.stateful_resources {
        state.resources.register(spec.clone())?;
    }

    let mocks = collection.into_mocks();
    let imported;
    let mut errors: Vec<Value> = Vec::new();
    if body.replace {
        imported = state.registry.replace_all(mocks)?.len();
    } else {
        let mut count = 0;
        for mock in mocks {
            match state.registry.create(mock) {
                Ok(_) => count += 1,
                Err(e) => errors.push(json!({"error": e.code(), "message": e.to_string()})),
            }
        }
        imported = count;
    }
    info!(imported, replace = body.replace, "configuration imported");
    Ok(Json(json!({
        "imported": imported,
        "replace": body.replace,
        "errors": errors,
    })))
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

async fn state_overview(State(state): State<AdminState>) -> Json<Value> {
    let counts: HashMap<String, usize> = state
        .registry
        .snapshot()
        .counts_by_kind()
        .into_iter()
        .map(|(kind, count)| (kind.as_str().to_string(), count))
        .collect();
    Json(json!({
        "mocks": counts,
        "resources": state.resources.overview(),
        "requestLogEntries": state.request_log.len(),
    }))
}

async fn state_reset(
    State(state): State<AdminState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let resource = params.get("resource").map(String::as_str);
    state.resources.reset(resource)?;
    info!(resource = resource.unwrap_or("*"), "stateful resources reset");
    Ok(Json(json!({"reset": resource.unwrap_or("*")})))
}

// ---------------------------------------------------------------------------
// Request log
// ---------------------------------------------------------------------------

async fn list_requests(
    State(state): State<AdminState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let query = LogQuery {
        method: params.get("method").cloned(),
        path: params.get("path").cloned(),
        matched: params.get("matched").cloned(),
        limit: params.get("limit").and_then(|v| v.parse().ok()),
        offset: params
            .get("offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
    };
    let entries = state.request_log.list(&query);
    Json(json!({"total": state.request_log.len(), "entries": entries}))
}

async fn get_request(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> ApiResult<Json<mockd_core::RequestLogEntry>> {
    state
        .request_log
        .get(&id)
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("request '{id}'")).into())
}

async fn clear_requests(State(state): State<AdminState>) -> StatusCode {
    state.request_log.clear();
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// Chaos
// ---------------------------------------------------------------------------

async fn get_chaos(State(state): State<AdminState>) -> Json<mockd_chaos::ChaosConfig> {
    Json(state.chaos.config())
}

async fn update_chaos(State(state): State<AdminState>, bytes: Bytes) -> ApiResult<Json<Value>> {
    let config: mockd_chaos::ChaosConfig = parse_json(&bytes)?;
    state.chaos.update_config(config)?;
    info!("chaos configuration updated");
    Ok(Json(json!({"updated": true})))
}

async fn chaos_stats(State(state): State<AdminState>) -> Json<mockd_chaos::ChaosStats> {
    Json(state.chaos.stats())
}

async fn reset_chaos_stats(State(state): State<AdminState>) -> StatusCode {
    state.chaos.reset_stats();
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// WebSocket administration
// ---------------------------------------------------------------------------

async fn ws_connections(
    State(state): State<AdminState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<mockd_ws::ConnectionInfo>> {
    Json(state.ws.list(
        params.get("endpoint").map(String::as_str),
        params.get("group").map(String::as_str),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    binary_hex: Option<String>,
}

impl SendBody {
    fn frame(&self) -> ApiResult<Outbound> {
        if let Some(text) = &self.text {
            return Ok(Outbound::Text(text.clone()));
        }
        if let Some(hex) = &self.binary_hex {
            let bytes = (0..hex.len())
                .step_by(2)
                .map(|i| {
                    hex.get(i..i + 2)
                        .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                })
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(|| ApiError::validation("binaryHex is not valid hex"))?;
            return Ok(Outbound::Binary(bytes));
        }
        Err(ApiError::validation("body needs 'text' or 'binaryHex'"))
    }
}

async fn ws_send(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    bytes: Bytes,
) -> ApiResult<Json<Value>> {
    let body: SendBody = parse_json(&bytes)?;
    state.ws.send(&id, body.frame()?)?;
    Ok(Json(json!({"sent": true})))
}

async fn ws_disconnect(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<StatusCode> {
    let code = params
        .get("code")
        .and_then(|v| v.parse().ok())
        .unwrap_or(mockd_ws::CLOSE_NORMAL);
    let reason = params.get("reason").map(String::as_str).unwrap_or("");
    state.ws.disconnect(&id, code, reason)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_join_group(
    State(state): State<AdminState>,
    Path((id, group)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.ws.join_group(&id, &group)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_leave_group(
    State(state): State<AdminState>,
    Path((id, group)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.ws.leave_group(&id, &group)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastBody {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(flatten)]
    send: SendBody,
}

async fn ws_broadcast(State(state): State<AdminState>, bytes: Bytes) -> ApiResult<Json<Value>> {
    let body: BroadcastBody = parse_json(&bytes)?;
    let frame = body.send.frame()?;
    let delivered = match (&body.path, &body.group) {
        (Some(path), None) => state.ws.broadcast_endpoint(path, &frame),
        (None, Some(group)) => state.ws.broadcast_group(group, &frame),
        _ => {
            return Err(ApiError::validation(
                "exactly one of 'path' or 'group' must be set",
            ))
        }
    };
    Ok(Json(json!({"delivered": delivered})))
}

async fn ws_stats(State(state): State<AdminState>) -> Json<mockd_ws::WsStats> {
    Json(state.ws.stats())
}

// ---------------------------------------------------------------------------
// Health and metrics
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn metrics_text(State(state): State<AdminState>) -> Response {
    let counts = state.registry.snapshot().counts_by_kind();
    state
        .metrics
        .set_mock_counts(counts.iter().map(|(kind, count)| (kind.as_str(), *count)));
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode_text(),
    )
        .into_response()
}
