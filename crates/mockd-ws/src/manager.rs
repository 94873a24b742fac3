//! WebSocket connection manager
//!
//! One runtime per configured endpoint: a connection set, group membership,
//! and counters. Each accepted socket gets a bounded send queue drained by a
//! single writer task; enqueue overflow closes the connection with a
//! policy-violation code. Endpoint changes arrive via registry sync and take
//! effect without touching the HTTP router.

use crate::matching::CompiledWsMatcher;
use crate::scenario;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use http::StatusCode;
use mockd_core::model::{MockSpec, WsEndpoint};
use mockd_core::template::{RenderContext, Template};
use mockd_core::{Error, RegistrySnapshot, Result};
use mockd_http::RouteHook;
use mockd_observability::MetricsRegistry;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Bounded per-connection send queue
pub const SEND_QUEUE_CAP: usize = 64;

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (teardown, heartbeat loss)
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Policy violation (queue overflow, failed scenario expectation)
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// A frame queued for delivery
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
}

pub(crate) struct EndpointRuntime {
    pub(crate) mock_id: String,
    pub(crate) config: WsEndpoint,
    pub(crate) matchers: Vec<CompiledWsMatcher>,
    pub(crate) default_response: Option<Template>,
    pub(crate) active: AtomicUsize,
    total_connections: AtomicU64,
    messages_in: AtomicU64,
    messages_out: AtomicU64,
}

impl EndpointRuntime {
    fn new(mock_id: String, config: WsEndpoint) -> Self {
        let matchers = config.matchers.iter().map(CompiledWsMatcher::compile).collect();
        let default_response = config.default_response.as_deref().map(Template::compile);
        Self {
            mock_id,
            config,
            matchers,
            default_response,
            active: AtomicUsize::new(0),
            total_connections: AtomicU64::new(0),
            messages_in: AtomicU64::new(0),
            messages_out: AtomicU64::new(0),
        }
    }
}

/// Handle for pushing frames at a live connection
pub struct ConnectionHandle {
    pub id: String,
    pub path: String,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<Outbound>,
    close: watch::Sender<Option<(u16, String)>>,
}

impl ConnectionHandle {
    /// Queue a frame; overflow closes the connection with 1008
    pub fn enqueue(&self, frame: Outbound) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn = %self.id, "send queue overflow, closing");
                self.request_close(CLOSE_POLICY_VIOLATION, "send queue overflow");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the writer to emit a close frame and stop
    pub fn request_close(&self, code: u16, reason: &str) {
        self.close.send_replace(Some((code, reason.to_string())));
    }

    fn close_watch(&self) -> watch::Receiver<Option<(u16, String)>> {
        self.close.subscribe()
    }
}

/// Connection facts for the admin surface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub path: String,
    pub groups: Vec<String>,
    pub connected_at: DateTime<Utc>,
}

/// Per-endpoint counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub path: String,
    pub active_connections: usize,
    pub total_connections: u64,
    pub messages_in: u64,
    pub messages_out: u64,
}

/// Manager-wide stats snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WsStats {
    pub total_active: usize,
    pub endpoints: Vec<EndpointStats>,
}

/// The WebSocket manager
pub struct WsManager {
    endpoints: RwLock<HashMap<String, Arc<EndpointRuntime>>>,
    connections: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
    groups: RwLock<HashMap<String, HashSet<String>>>,
    metrics: MetricsRegistry,
}

impl WsManager {
    /// Create a manager recording into the given metrics registry
    pub fn new(metrics: MetricsRegistry) -> Arc<Self> {
        Arc::new(Self {
            endpoints: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            metrics,
        })
    }

    /// Reconcile endpoints with a registry snapshot
    ///
    /// Removed or changed endpoints disconnect their connections with a
    /// going-away close; unchanged endpoints keep their counters.
    pub fn sync(&self, snapshot: &RegistrySnapshot) {
        let desired: HashMap<String, (String, WsEndpoint)> = snapshot
            .mocks()
            .iter()
            .filter(|m| m.is_enabled())
            .filter_map(|m| match &m.spec {
                MockSpec::Ws(endpoint) => {
                    Some((endpoint.path.clone(), (m.id.clone(), endpoint.clone())))
                }
                _ => None,
            })
            .collect();

        let mut to_close: Vec<String> = Vec::new();
        {
            let mut endpoints = self.endpoints.write();
            endpoints.retain(|path, runtime| {
                let keep = desired
                    .get(path)
                    .is_some_and(|(id, config)| runtime.mock_id == *id && runtime.config == *config);
                if !keep {
                    to_close.push(path.clone());
                }
                keep
            });
            for (path, (mock_id, config)) in desired {
                endpoints
                    .entry(path)
                    .or_insert_with(|| Arc::new(EndpointRuntime::new(mock_id, config)));
            }
        }
        for path in to_close {
            debug!(%path, "websocket endpoint removed or changed, disconnecting");
            self.disconnect_path(&path);
        }
    }

    fn disconnect_path(&self, path: &str) {
        let targets: Vec<Arc<ConnectionHandle>> = self
            .connections
            .read()
            .values()
            .filter(|c| c.path == path)
            .cloned()
            .collect();
        for conn in targets {
            conn.request_close(CLOSE_GOING_AWAY, "endpoint removed");
        }
    }

    /// Attempt to handle a traffic-port request as a WebSocket upgrade
    pub(crate) async fn handle_request(
        self: &Arc<Self>,
        req: Request,
    ) -> std::result::Result<Response, Request> {
        let path = req.uri().path().to_string();
        let Some(endpoint) = self.endpoints.read().get(&path).cloned() else {
            return Err(req);
        };
        if !is_upgrade(&req) {
            return Err(req);
        }

        if endpoint.config.require_subprotocol {
            let offered = offered_protocols(&req);
            let accepted = offered
                .iter()
                .any(|p| endpoint.config.subprotocols.iter().any(|s| s == p));
            if !accepted {
                return Ok(status_response(
                    StatusCode::BAD_REQUEST,
                    "no acceptable subprotocol",
                ));
            }
        }

        if let Some(max) = endpoint.config.max_connections {
            if endpoint.active.load(Ordering::Relaxed) >= max {
                return Ok(status_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "max connections reached",
                ));
            }
        }

        let (mut parts, body) = req.into_parts();
        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => return Ok(rejection.into_response()),
        };
        let upgrade = if endpoint.config.subprotocols.is_empty() {
            upgrade
        } else {
            upgrade.protocols(endpoint.config.subprotocols.clone())
        };
        let _ = body;

        let manager = Arc::clone(self);
        Ok(upgrade.on_upgrade(move |socket| run_connection(manager, endpoint, socket)))
    }

    fn register(&self, handle: Arc<ConnectionHandle>) {
        self.connections.write().insert(handle.id.clone(), handle);
        self.metrics.connection_opened("ws");
    }

    fn unregister(&self, id: &str) {
        self.connections.write().remove(id);
        let mut groups = self.groups.write();
        groups.retain(|_, members| {
            members.remove(id);
            !members.is_empty()
        });
        self.metrics.connection_closed("ws");
    }

    fn connection(&self, id: &str) -> Result<Arc<ConnectionHandle>> {
        self.connections
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("connection '{id}'")))
    }

    /// List live connections, optionally filtered by endpoint path or group
    pub fn list(&self, endpoint: Option<&str>, group: Option<&str>) -> Vec<ConnectionInfo> {
        let groups = self.groups.read();
        let group_members: Option<HashSet<String>> =
            group.map(|g| groups.get(g).cloned().unwrap_or_default());
        self.connections
            .read()
            .values()
            .filter(|c| endpoint.is_none_or(|path| c.path == path))
            .filter(|c| {
                group_members
                    .as_ref()
                    .is_none_or(|members| members.contains(&c.id))
            })
            .map(|c| ConnectionInfo {
                id: c.id.clone(),
                path: c.path.clone(),
                groups: groups
                    .iter()
                    .filter(|(_, members)| members.contains(&c.id))
                    .map(|(name, _)| name.clone())
                    .collect(),
                connected_at: c.connected_at,
            })
            .collect()
    }

    /// Send one frame to one connection
    pub fn send(&self, id: &str, frame: Outbound) -> Result<()> {
        let conn = self.connection(id)?;
        if conn.enqueue(frame) {
            Ok(())
        } else {
            Err(Error::unavailable(format!("connection '{id}' not writable")))
        }
    }

    /// Close one connection
    pub fn disconnect(&self, id: &str, code: u16, reason: &str) -> Result<()> {
        let conn = self.connection(id)?;
        conn.request_close(code, reason);
        Ok(())
    }

    /// Send to every connection on an endpoint; returns the delivery count
    pub fn broadcast_endpoint(&self, path: &str, frame: &Outbound) -> usize {
        let targets: Vec<Arc<ConnectionHandle>> = self
            .connections
            .read()
            .values()
            .filter(|c| c.path == path)
            .cloned()
            .collect();
        let mut delivered = 0;
        for conn in targets {
            if conn.enqueue(frame.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send to every live member of a group; each member gets it once
    pub fn broadcast_group(&self, group: &str, frame: &Outbound) -> usize {
        let member_ids: Vec<String> = self
            .groups
            .read()
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        let mut delivered = 0;
        for id in member_ids {
            if let Ok(conn) = self.connection(&id) {
                if conn.enqueue(frame.clone()) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Add a connection to a group
    pub fn join_group(&self, id: &str, group: &str) -> Result<()> {
        self.connection(id)?;
        self.groups
            .write()
            .entry(group.to_string())
            .or_default()
            .insert(id.to_string());
        Ok(())
    }

    /// Remove a connection from a group
    pub fn leave_group(&self, id: &str, group: &str) -> Result<()> {
        self.connection(id)?;
        let mut groups = self.groups.write();
        if let Some(members) = groups.get_mut(group) {
            members.remove(id);
            if members.is_empty() {
                groups.remove(group);
            }
        }
        Ok(())
    }

    /// Counter snapshot across endpoints
    pub fn stats(&self) -> WsStats {
        let endpoints: Vec<EndpointStats> = self
            .endpoints
            .read()
            .values()
            .map(|e| EndpointStats {
                path: e.config.path.clone(),
                active_connections: e.active.load(Ordering::Relaxed),
                total_connections: e.total_connections.load(Ordering::Relaxed),
                messages_in: e.messages_in.load(Ordering::Relaxed),
                messages_out: e.messages_out.load(Ordering::Relaxed),
            })
            .collect();
        WsStats {
            total_active: self.connections.read().len(),
            endpoints,
        }
    }
}

/// The hook plugged into the HTTP dispatch chain
pub struct WsHook(pub Arc<WsManager>);

impl RouteHook for WsHook {
    fn try_handle(
        &self,
        req: Request,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Response, Request>> + Send + '_>,
    > {
        Box::pin(async move { self.0.handle_request(req).await })
    }
}

fn is_upgrade(req: &Request) -> bool {
    req.headers()
        .get(http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

fn offered_protocols(req: &Request) -> Vec<String> {
    req.headers()
        .get(http::header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').map(|p| p.trim().to_string()).collect())
        .unwrap_or_default()
}

fn status_response(status: StatusCode, message: &str) -> Response {
    (status, message.to_string()).into_response()
}

async fn run_connection(manager: Arc<WsManager>, endpoint: Arc<EndpointRuntime>, socket: WebSocket) {
    let (sender, mut queue) = mpsc::channel::<Outbound>(SEND_QUEUE_CAP);
    // The writer inherits the first receiver so no close request can be lost.
    let (close_tx, mut writer_close) = watch::channel::<Option<(u16, String)>>(None);
    let handle = Arc::new(ConnectionHandle {
        id: uuid::Uuid::new_v4().to_string(),
        path: endpoint.config.path.clone(),
        connected_at: Utc::now(),
        sender,
        close: close_tx,
    });

    debug!(conn = %handle.id, path = %handle.path, "websocket connected");
    manager.register(Arc::clone(&handle));
    endpoint.active.fetch_add(1, Ordering::Relaxed);
    endpoint.total_connections.fetch_add(1, Ordering::Relaxed);

    let (mut sink, mut stream) = socket.split();

    // Single-writer rule: this task owns the sink; producers enqueue.
    let endpoint_for_writer = Arc::clone(&endpoint);
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = writer_close.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let requested = writer_close.borrow_and_update().clone();
                    if let Some((code, reason)) = requested {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code,
                                reason: reason.into(),
                            })))
                            .await;
                        break;
                    }
                }
                frame = queue.recv() => {
                    let Some(frame) = frame else { break };
                    let message = match frame {
                        Outbound::Text(text) => Message::Text(text.into()),
                        Outbound::Binary(data) => Message::Binary(data.into()),
                        Outbound::Ping(data) => Message::Ping(data.into()),
                    };
                    if !matches!(message, Message::Ping(_)) {
                        endpoint_for_writer.messages_out.fetch_add(1, Ordering::Relaxed);
                    }
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let proceed = match &endpoint.config.scenario {
        Some(steps) => scenario::run(&manager, &handle, &mut stream, steps).await,
        None => true,
    };

    if proceed {
        message_loop(&endpoint, &handle, &mut stream).await;
    }

    handle.request_close(CLOSE_NORMAL, "");
    let _ = writer.await;
    endpoint.active.fetch_sub(1, Ordering::Relaxed);
    manager.unregister(&handle.id);
    debug!(conn = %handle.id, "websocket disconnected");
}

async fn message_loop(
    endpoint: &EndpointRuntime,
    handle: &ConnectionHandle,
    stream: &mut (impl futures_util::Stream<Item = std::result::Result<Message, axum::Error>> + Unpin),
) {
    let heartbeat = endpoint.config.heartbeat.clone();
    let period = heartbeat
        .as_ref()
        .map_or(Duration::from_secs(3600), |hb| {
            Duration::from_millis(hb.interval_ms.max(1))
        });
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.reset();
    let mut last_pong = Instant::now();
    let mut close_rx = handle.close_watch();

    loop {
        tokio::select! {
            _ = close_rx.changed() => break,
            _ = ticker.tick(), if heartbeat.is_some() => {
                let Some(hb) = &heartbeat else { break };
                let deadline = Duration::from_millis(hb.interval_ms + hb.timeout_ms);
                if last_pong.elapsed() > deadline {
                    debug!(conn = %handle.id, "heartbeat timeout");
                    handle.request_close(CLOSE_GOING_AWAY, "heartbeat timeout");
                    break;
                }
                handle.enqueue(Outbound::Ping(Vec::new()));
            }
            inbound = stream.next() => {
                match inbound {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Pong(_))) => last_pong = Instant::now(),
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(message)) => handle_message(endpoint, handle, &message),
                }
            }
        }
    }
}

fn handle_message(endpoint: &EndpointRuntime, handle: &ConnectionHandle, message: &Message) {
    endpoint.messages_in.fetch_add(1, Ordering::Relaxed);
    let ctx = message_context(message);

    for matcher in &endpoint.matchers {
        if matcher.matches(message) {
            handle.enqueue(Outbound::Text(matcher.response.render(&ctx)));
            return;
        }
    }
    if let Some(default) = &endpoint.default_response {
        handle.enqueue(Outbound::Text(default.render(&ctx)));
        return;
    }
    if endpoint.config.echo_mode {
        match message {
            Message::Text(text) => {
                handle.enqueue(Outbound::Text(text.to_string()));
            }
            Message::Binary(data) => {
                handle.enqueue(Outbound::Binary(data.to_vec()));
            }
            _ => {}
        }
    }
}

pub(crate) fn message_context(message: &Message) -> RenderContext {
    let mut ctx = RenderContext::default();
    if let Message::Text(text) = message {
        ctx.vars.insert("message".to_string(), text.to_string());
        if let Ok(parsed) = serde_json::from_str(text.as_str()) {
            ctx.payload = Some(parsed);
        }
    }
    ctx
}
