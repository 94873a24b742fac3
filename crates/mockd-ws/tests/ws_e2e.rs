//! End-to-end tests for the WebSocket manager

use futures_util::{SinkExt, StreamExt};
use mockd_chaos::ChaosInjector;
use mockd_core::model::{
    HeartbeatConfig, Mock, MockSpec, ScenarioStep, WsEndpoint, WsMatchRule, WsMatcher,
};
use mockd_core::{MockRegistry, RegistryEvent, RegistryListener, RequestLog, ResourceStore};
use mockd_http::{build_router, HttpState};
use mockd_observability::MetricsRegistry;
use mockd_ws::{Outbound, WsHook, WsManager};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

struct Harness {
    addr: SocketAddr,
    registry: Arc<MockRegistry>,
    manager: Arc<WsManager>,
}

struct SyncListener {
    registry: Arc<MockRegistry>,
    manager: Arc<WsManager>,
}

impl RegistryListener for SyncListener {
    fn on_event(&self, _event: &RegistryEvent) {
        self.manager.sync(&self.registry.snapshot());
    }
}

async fn start() -> Harness {
    let registry = Arc::new(MockRegistry::new());
    let metrics = MetricsRegistry::new();
    let manager = WsManager::new(metrics.clone());
    registry.subscribe(Arc::new(SyncListener {
        registry: Arc::clone(&registry),
        manager: Arc::clone(&manager),
    }));

    let state = HttpState::new(
        Arc::clone(&registry),
        Arc::new(ResourceStore::new()),
        Arc::new(RequestLog::new(100)),
        Arc::new(ChaosInjector::disabled()),
        metrics,
    )
    .with_hooks(vec![Arc::new(WsHook(Arc::clone(&manager)))]);

    let router = build_router(state, None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Harness {
        addr,
        registry,
        manager,
    }
}

fn ws_mock(endpoint: WsEndpoint) -> Mock {
    Mock::new(MockSpec::Ws(endpoint))
}

fn chat_endpoint() -> WsEndpoint {
    WsEndpoint {
        path: "/ws/chat".into(),
        echo_mode: true,
        matchers: vec![WsMatcher {
            rule: WsMatchRule::Exact {
                value: "ping".into(),
            },
            response: "pong".into(),
        }],
        default_response: None,
        scenario: None,
        subprotocols: vec![],
        require_subprotocol: false,
        max_connections: None,
        heartbeat: None,
    }
}

async fn connect(
    harness: &Harness,
    path: &str,
) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let url = format!("ws://{}{}", harness.addr, path);
    let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
}

async fn next_text(
    socket: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> String {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("socket error");
        if let Message::Text(text) = message {
            return text.to_string();
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn matcher_hit_and_echo_fallback() {
    let harness = start().await;
    harness.registry.create(ws_mock(chat_endpoint())).unwrap();

    let mut socket = connect(&harness, "/ws/chat").await;

    socket.send(Message::text("ping")).await.unwrap();
    assert_eq!(next_text(&mut socket).await, "pong");

    socket.send(Message::text("hello")).await.unwrap();
    assert_eq!(next_text(&mut socket).await, "hello");
}

#[tokio::test(flavor = "multi_thread")]
async fn default_response_beats_echo() {
    let harness = start().await;
    let mut endpoint = chat_endpoint();
    endpoint.default_response = Some("unknown command".into());
    harness.registry.create(ws_mock(endpoint)).unwrap();

    let mut socket = connect(&harness, "/ws/chat").await;
    socket.send(Message::text("whatever")).await.unwrap();
    assert_eq!(next_text(&mut socket).await, "unknown command");
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_sends_greeting_then_expects() {
    let harness = start().await;
    let mut endpoint = chat_endpoint();
    endpoint.scenario = Some(vec![
        ScenarioStep::Send {
            message: "welcome".into(),
        },
        ScenarioStep::Receive {
            rule: Some(WsMatchRule::Exact {
                value: "ready".into(),
            }),
            timeout_ms: 2_000,
        },
        ScenarioStep::Send {
            message: "go".into(),
        },
    ]);
    harness.registry.create(ws_mock(endpoint)).unwrap();

    let mut socket = connect(&harness, "/ws/chat").await;
    assert_eq!(next_text(&mut socket).await, "welcome");
    socket.send(Message::text("ready")).await.unwrap();
    assert_eq!(next_text(&mut socket).await, "go");

    // Scenario finished; the message loop now answers matchers.
    socket.send(Message::text("ping")).await.unwrap();
    assert_eq!(next_text(&mut socket).await, "pong");
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_expectation_closes_with_policy_violation() {
    let harness = start().await;
    let mut endpoint = chat_endpoint();
    endpoint.scenario = Some(vec![ScenarioStep::Expect {
        rule: Some(WsMatchRule::Exact {
            value: "token".into(),
        }),
        timeout_ms: 100,
    }]);
    harness.registry.create(ws_mock(endpoint)).unwrap();

    let mut socket = connect(&harness, "/ws/chat").await;
    // Say nothing; the expectation must time out.
    let mut close_code = None;
    while let Some(Ok(message)) = socket.next().await {
        if let Message::Close(Some(frame)) = message {
            close_code = Some(u16::from(frame.code));
            break;
        }
    }
    assert_eq!(close_code, Some(1008));
}

#[tokio::test(flavor = "multi_thread")]
async fn group_broadcast_delivers_exactly_once() {
    let harness = start().await;
    harness.registry.create(ws_mock(chat_endpoint())).unwrap();

    let mut a = connect(&harness, "/ws/chat").await;
    let mut b = connect(&harness, "/ws/chat").await;
    let _c = connect(&harness, "/ws/chat").await;

    // Let registrations land, then put a and b in a group.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let ids: Vec<String> = harness
        .manager
        .list(Some("/ws/chat"), None)
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids.len(), 3);
    harness.manager.join_group(&ids[0], "room-1").unwrap();
    harness.manager.join_group(&ids[1], "room-1").unwrap();

    let delivered = harness
        .manager
        .broadcast_group("room-1", &Outbound::Text("announcement".into()));
    assert_eq!(delivered, 2);

    assert_eq!(next_text(&mut a).await, "announcement");
    assert_eq!(next_text(&mut b).await, "announcement");
}

#[tokio::test(flavor = "multi_thread")]
async fn endpoint_broadcast_counts_live_connections() {
    let harness = start().await;
    harness.registry.create(ws_mock(chat_endpoint())).unwrap();

    let mut a = connect(&harness, "/ws/chat").await;
    let mut b = connect(&harness, "/ws/chat").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let delivered = harness
        .manager
        .broadcast_endpoint("/ws/chat", &Outbound::Text("all".into()));
    assert_eq!(delivered, 2);
    assert_eq!(next_text(&mut a).await, "all");
    assert_eq!(next_text(&mut b).await, "all");
}

#[tokio::test(flavor = "multi_thread")]
async fn max_connections_zero_rejects() {
    let harness = start().await;
    let mut endpoint = chat_endpoint();
    endpoint.max_connections = Some(0);
    harness.registry.create(ws_mock(endpoint)).unwrap();

    let url = format!("ws://{}/ws/chat", harness.addr);
    let result = tokio_tungstenite::connect_async(url).await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_endpoint_disconnects_clients() {
    let harness = start().await;
    let created = harness.registry.create(ws_mock(chat_endpoint())).unwrap();

    let mut socket = connect(&harness, "/ws/chat").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.registry.delete(&created.id).unwrap();

    let mut closed = false;
    while let Ok(Some(Ok(message))) =
        tokio::time::timeout(Duration::from_secs(2), socket.next()).await
    {
        if matches!(message, Message::Close(_)) {
            closed = true;
            break;
        }
    }
    assert!(closed);

    // New connections fall through to HTTP dispatch and miss.
    let url = format!("ws://{}/ws/chat", harness.addr);
    assert!(tokio_tungstenite::connect_async(url).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn heartbeat_pings_keep_connection_alive() {
    let harness = start().await;
    let mut endpoint = chat_endpoint();
    endpoint.heartbeat = Some(HeartbeatConfig {
        interval_ms: 50,
        timeout_ms: 500,
    });
    harness.registry.create(ws_mock(endpoint)).unwrap();

    let mut socket = connect(&harness, "/ws/chat").await;
    // tungstenite answers pings automatically; the connection must survive
    // several heartbeat intervals and still respond to matchers.
    tokio::time::sleep(Duration::from_millis(300)).await;
    socket.send(Message::text("ping")).await.unwrap();
    assert_eq!(next_text(&mut socket).await, "pong");
}

#[tokio::test(flavor = "multi_thread")]
async fn stats_track_connections_and_messages() {
    let harness = start().await;
    harness.registry.create(ws_mock(chat_endpoint())).unwrap();

    let mut socket = connect(&harness, "/ws/chat").await;
    socket.send(Message::text("ping")).await.unwrap();
    assert_eq!(next_text(&mut socket).await, "pong");

    let stats = harness.manager.stats();
    assert_eq!(stats.total_active, 1);
    let endpoint = &stats.endpoints[0];
    assert_eq!(endpoint.path, "/ws/chat");
    assert_eq!(endpoint.active_connections, 1);
    assert!(endpoint.messages_in >= 1);
    assert!(endpoint.messages_out >= 1);
}
