//! The embedded MQTT broker
//!
//! Hosts one MQTT 3.1.1 listener per configured endpoint: session handling,
//! QoS 0/1 publish routing, retained messages, authentication, auto-publish
//! loops, and the on-publish / request-response rules. One task per client
//! connection; a single writer task per connection owns the socket's write
//! half.

use crate::codec::{
    self, ConnackCode, ConnectPacket, Packet, ProtocolError, PublishPacket,
};
use crate::topics::{match_filter, substitute_captures, TopicTree};
use mockd_core::model::{AutoPublishTopic, MockResponseRule, MqttEndpoint, OnPublishRule};
use mockd_core::template::{RenderContext, Template};
use mockd_core::{Error, Result};
use mockd_observability::MetricsRegistry;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const MAX_PACKET_SIZE: usize = 1024 * 1024;
const CLIENT_QUEUE_CAP: usize = 256;

struct ClientHandle {
    sender: mpsc::Sender<Packet>,
}

struct CompiledOnPublish {
    trigger: String,
    response: Option<Template>,
    forward_to: Option<String>,
}

struct CompiledResponseRule {
    trigger: String,
    response_topic: String,
    payload: Template,
}

struct BrokerInner {
    endpoint: MqttEndpoint,
    topics: Mutex<TopicTree>,
    clients: RwLock<HashMap<String, ClientHandle>>,
    on_publish: Vec<CompiledOnPublish>,
    responses: Vec<CompiledResponseRule>,
    next_packet_id: AtomicU32,
    metrics: MetricsRegistry,
}

impl BrokerInner {
    fn packet_id(&self) -> u16 {
        // Skip 0, which the protocol reserves.
        let id = (self.next_packet_id.fetch_add(1, Ordering::Relaxed) % 0xfffe) + 1;
        id as u16
    }

    /// Deliver to matching subscribers (no rule evaluation)
    fn route(&self, topic: &str, payload: &[u8], qos: u8, retain: bool) {
        if retain {
            self.topics.lock().retain(topic, payload.to_vec(), qos);
        }
        let subscribers = self.topics.lock().match_topic(topic);
        let clients = self.clients.read();
        for subscription in subscribers {
            let Some(client) = clients.get(&subscription.client_id) else {
                continue;
            };
            let effective_qos = qos.min(subscription.qos).min(1);
            let packet = Packet::Publish(PublishPacket {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos: effective_qos,
                retain: false,
                dup: false,
                packet_id: (effective_qos > 0).then(|| self.packet_id()),
            });
            if client.sender.try_send(packet).is_err() {
                warn!(client = %subscription.client_id, %topic, "client queue full, dropping message");
            }
        }
    }

    /// Handle a client-originated publish: route, then evaluate rules
    ///
    /// Rule-produced messages are routed without re-evaluating rules, so a
    /// response on the trigger topic cannot loop.
    fn handle_publish(&self, publish: &PublishPacket) {
        self.route(&publish.topic, &publish.payload, publish.qos, publish.retain);

        let ctx = publish_context(&publish.topic, &publish.payload, &[]);
        for rule in &self.on_publish {
            if match_filter(&publish.topic, &rule.trigger).is_none() {
                continue;
            }
            if let Some(response) = &rule.response {
                let payload = response.render(&ctx);
                debug!(topic = %publish.topic, "on-publish response");
                self.route(&publish.topic, payload.as_bytes(), publish.qos, false);
            }
            if let Some(forward_to) = &rule.forward_to {
                debug!(from = %publish.topic, to = %forward_to, "on-publish forward");
                self.route(forward_to, &publish.payload, publish.qos, false);
            }
        }

        for rule in &self.responses {
            let Some(captures) = match_filter(&publish.topic, &rule.trigger) else {
                continue;
            };
            let response_topic = substitute_captures(&rule.response_topic, &captures);
            let ctx = publish_context(&publish.topic, &publish.payload, &captures);
            let payload = rule.payload.render(&ctx);
            debug!(trigger = %publish.topic, response = %response_topic, "mock response");
            self.route(&response_topic, payload.as_bytes(), 0, false);
        }
    }

    fn authenticate(&self, connect: &ConnectPacket) -> ConnackCode {
        let Some(auth) = &self.endpoint.auth else {
            return ConnackCode::Accepted;
        };
        if !auth.enabled {
            return ConnackCode::Accepted;
        }
        let (Some(username), Some(password)) = (&connect.username, &connect.password) else {
            return ConnackCode::NotAuthorized;
        };
        let matched = auth
            .users
            .iter()
            .any(|u| &u.username == username && &u.password == password);
        if matched {
            ConnackCode::Accepted
        } else {
            ConnackCode::BadUsernamePassword
        }
    }
}

fn publish_context(topic: &str, payload: &[u8], captures: &[String]) -> RenderContext {
    let mut ctx = RenderContext {
        topic: Some(topic.to_string()),
        captures: captures.to_vec(),
        ..RenderContext::default()
    };
    if let Ok(parsed) = serde_json::from_slice(payload) {
        ctx.payload = Some(parsed);
    }
    ctx
}

/// A running broker bound to one port
pub struct MqttBroker {
    inner: Arc<BrokerInner>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl MqttBroker {
    /// Bind the listener and start serving
    ///
    /// A configured port of 0 asks the OS for one; read it back with
    /// [`Self::local_addr`].
    pub async fn start(endpoint: MqttEndpoint, metrics: MetricsRegistry) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", endpoint.port))
            .await
            .map_err(Error::Io)?;
        let local_addr = listener.local_addr().map_err(Error::Io)?;

        let on_publish = endpoint
            .on_publish
            .iter()
            .map(|rule: &OnPublishRule| CompiledOnPublish {
                trigger: rule.trigger.clone(),
                response: rule.response.as_deref().map(Template::compile),
                forward_to: rule.forward_to.clone(),
            })
            .collect();
        let responses = endpoint
            .responses
            .iter()
            .map(|rule: &MockResponseRule| CompiledResponseRule {
                trigger: rule.trigger.clone(),
                response_topic: rule.response_topic.clone(),
                payload: Template::compile(&rule.payload),
            })
            .collect();

        let inner = Arc::new(BrokerInner {
            topics: Mutex::new(TopicTree::new()),
            clients: RwLock::new(HashMap::new()),
            on_publish,
            responses,
            next_packet_id: AtomicU32::new(0),
            metrics,
            endpoint,
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        info!(addr = %local_addr, "mqtt broker listening");

        for topic in inner.endpoint.auto_publish.clone() {
            tokio::spawn(auto_publish_loop(
                Arc::clone(&inner),
                topic,
                shutdown_rx.clone(),
            ));
        }

        let accept_inner = Arc::clone(&inner);
        let mut accept_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_shutdown.changed() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, peer)) = accepted else { break };
                        debug!(%peer, "mqtt client connecting");
                        tokio::spawn(handle_client(
                            Arc::clone(&accept_inner),
                            stream,
                            accept_shutdown.clone(),
                        ));
                    }
                }
            }
        });

        Ok(Self {
            inner,
            local_addr,
            shutdown,
        })
    }

    /// The bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Publish into the broker programmatically (admin/test use)
    pub fn publish(&self, topic: &str, payload: &[u8], qos: u8, retain: bool) {
        self.inner.route(topic, payload, qos, retain);
    }

    /// Connected client ids
    pub fn connected_clients(&self) -> Vec<String> {
        self.inner.clients.read().keys().cloned().collect()
    }

    /// Stop accepting, cancel loops, and drop client sessions
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn auto_publish_loop(
    inner: Arc<BrokerInner>,
    topic: AutoPublishTopic,
    mut shutdown: watch::Receiver<bool>,
) {
    let templates: Vec<(Template, u64)> = topic
        .messages
        .iter()
        .map(|m| (Template::compile(&m.payload), m.interval_ms))
        .collect();
    let cycle = topic.messages.iter().any(|m| m.repeat);
    loop {
        for (template, interval_ms) in &templates {
            let ctx = RenderContext {
                topic: Some(topic.topic.clone()),
                ..RenderContext::default()
            };
            let payload = template.render(&ctx);
            inner.route(&topic.topic, payload.as_bytes(), topic.qos.min(1), false);
            tokio::select! {
                _ = shutdown.changed() => return,
                () = tokio::time::sleep(Duration::from_millis(*interval_ms)) => {}
            }
        }
        if !cycle {
            break;
        }
    }
}

async fn handle_client(
    inner: Arc<BrokerInner>,
    stream: TcpStream,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = stream.into_split();

    // Handshake: first packet must be CONNECT.
    let connect = match codec::read_packet(&mut reader, MAX_PACKET_SIZE).await {
        Ok(Packet::Connect(connect)) => connect,
        Ok(_) | Err(_) => return,
    };

    let code = inner.authenticate(&connect);
    let accepted = code == ConnackCode::Accepted;
    let connack = Packet::ConnAck {
        session_present: false,
        code,
    };
    if writer.write_all(&codec::encode_packet(&connack)).await.is_err() || !accepted {
        return;
    }

    let client_id = if connect.client_id.is_empty() {
        format!("mockd-{}", uuid::Uuid::new_v4())
    } else {
        connect.client_id.clone()
    };
    debug!(client = %client_id, "mqtt client connected");

    let (sender, receiver) = mpsc::channel::<Packet>(CLIENT_QUEUE_CAP);
    inner
        .clients
        .write()
        .insert(client_id.clone(), ClientHandle { sender: sender.clone() });
    inner.metrics.connection_opened("mqtt");

    let writer_task = tokio::spawn(writer_loop(writer, receiver));
    let clean_disconnect =
        session_loop(&inner, &mut reader, &sender, &client_id, &mut shutdown).await;

    inner.clients.write().remove(&client_id);
    inner.topics.lock().remove_client(&client_id);
    inner.metrics.connection_closed("mqtt");
    drop(sender);
    let _ = writer_task.await;

    // Will messages fire only on abrupt disconnect, per the protocol.
    if !clean_disconnect {
        if let Some(will) = &connect.will {
            debug!(client = %client_id, topic = %will.topic, "publishing will");
            inner.route(&will.topic, &will.payload, will.qos.min(1), will.retain);
        }
    }
    debug!(client = %client_id, clean = clean_disconnect, "mqtt client disconnected");
}

async fn writer_loop(mut writer: OwnedWriteHalf, mut receiver: mpsc::Receiver<Packet>) {
    while let Some(packet) = receiver.recv().await {
        if writer.write_all(&codec::encode_packet(&packet)).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Returns true when the client sent DISCONNECT
async fn session_loop(
    inner: &Arc<BrokerInner>,
    reader: &mut OwnedReadHalf,
    sender: &mpsc::Sender<Packet>,
    client_id: &str,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        let packet = tokio::select! {
            _ = shutdown.changed() => return true,
            packet = codec::read_packet(reader, MAX_PACKET_SIZE) => packet,
        };
        match packet {
            Ok(Packet::Publish(publish)) => {
                if publish.qos > 0 {
                    let ack = Packet::PubAck {
                        packet_id: publish.packet_id.unwrap_or(1),
                    };
                    if sender.send(ack).await.is_err() {
                        return false;
                    }
                }
                inner.handle_publish(&publish);
            }
            Ok(Packet::Subscribe { packet_id, filters }) => {
                let mut return_codes = Vec::with_capacity(filters.len());
                let mut retained = Vec::new();
                {
                    let mut topics = inner.topics.lock();
                    for (filter, requested_qos) in &filters {
                        // QoS 2 is downgraded; grant at most 1.
                        let granted = (*requested_qos).min(1);
                        topics.subscribe(filter, granted, client_id);
                        return_codes.push(granted);
                        for (topic, message) in topics.retained_for_filter(filter) {
                            retained.push((topic, message, granted));
                        }
                    }
                }
                let ack = Packet::SubAck {
                    packet_id,
                    return_codes,
                };
                if sender.send(ack).await.is_err() {
                    return false;
                }
                for (topic, message, granted) in retained {
                    let qos = message.qos.min(granted);
                    let publish = Packet::Publish(PublishPacket {
                        topic,
                        payload: message.payload,
                        qos,
                        retain: true,
                        dup: false,
                        packet_id: (qos > 0).then(|| inner.packet_id()),
                    });
                    if sender.send(publish).await.is_err() {
                        return false;
                    }
                }
            }
            Ok(Packet::Unsubscribe { packet_id, filters }) => {
                {
                    let mut topics = inner.topics.lock();
                    for filter in &filters {
                        topics.unsubscribe(filter, client_id);
                    }
                }
                if sender.send(Packet::UnsubAck { packet_id }).await.is_err() {
                    return false;
                }
            }
            Ok(Packet::PingReq) => {
                if sender.send(Packet::PingResp).await.is_err() {
                    return false;
                }
            }
            Ok(Packet::Disconnect) => return true,
            Ok(Packet::PubAck { .. }) => {}
            Ok(other) => {
                debug!(client = %client_id, ?other, "unexpected packet, closing");
                return false;
            }
            Err(ProtocolError::ConnectionClosed) => return false,
            Err(e) => {
                debug!(client = %client_id, error = %e, "protocol error, closing");
                return false;
            }
        }
    }
}
