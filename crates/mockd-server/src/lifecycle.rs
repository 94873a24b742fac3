//! Protocol listener supervision
//!
//! Subscribes to registry changes and reconciles the per-protocol runtimes:
//! WebSocket endpoints and GraphQL schemas swap in place on the traffic
//! port, while MQTT brokers and gRPC servers are spawned or torn down per
//! endpoint mock.

use mockd_core::model::MockSpec;
use mockd_core::{MockRegistry, RegistryEvent, RegistryListener};
use mockd_graphql::GraphqlDispatcher;
use mockd_grpc::GrpcMockServer;
use mockd_mqtt::MqttBroker;
use mockd_observability::MetricsRegistry;
use mockd_ws::WsManager;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Reconciles protocol listeners against the registry
pub struct Supervisor {
    registry: Arc<MockRegistry>,
    pub ws: Arc<WsManager>,
    pub graphql: Arc<GraphqlDispatcher>,
    mqtt: Mutex<HashMap<String, Arc<MqttBroker>>>,
    grpc: Mutex<HashMap<String, Arc<GrpcMockServer>>>,
    metrics: MetricsRegistry,
}

impl Supervisor {
    /// Create and subscribe to the registry
    pub fn new(registry: Arc<MockRegistry>, metrics: MetricsRegistry) -> Arc<Self> {
        let supervisor = Arc::new(Self {
            ws: WsManager::new(metrics.clone()),
            graphql: GraphqlDispatcher::new(),
            mqtt: Mutex::new(HashMap::new()),
            grpc: Mutex::new(HashMap::new()),
            registry: Arc::clone(&registry),
            metrics,
        });
        registry.subscribe(Arc::new(SupervisorListener(Arc::downgrade(&supervisor))));
        supervisor
    }

    /// Bound address of the broker serving one MQTT endpoint mock
    pub fn mqtt_addr(&self, mock_id: &str) -> Option<SocketAddr> {
        self.mqtt.lock().get(mock_id).map(|b| b.local_addr())
    }

    /// Bound address of the server for one gRPC endpoint mock
    pub fn grpc_addr(&self, mock_id: &str) -> Option<SocketAddr> {
        self.grpc.lock().get(mock_id).map(|s| s.local_addr())
    }

    /// Reconcile everything against the current snapshot
    pub fn sync(self: &Arc<Self>) {
        let snapshot = self.registry.snapshot();
        self.ws.sync(&snapshot);
        self.graphql.sync(&snapshot);
        self.metrics.set_mock_counts(
            snapshot
                .counts_by_kind()
                .iter()
                .map(|(kind, count)| (kind.as_str(), *count)),
        );

        let mut desired_mqtt: HashMap<String, mockd_core::model::MqttEndpoint> = HashMap::new();
        let mut desired_grpc: HashMap<String, mockd_core::model::GrpcEndpoint> = HashMap::new();
        for mock in snapshot.mocks() {
            if !mock.is_enabled() {
                continue;
            }
            match &mock.spec {
                MockSpec::Mqtt(endpoint) => {
                    desired_mqtt.insert(mock.id.clone(), endpoint.clone());
                }
                MockSpec::Grpc(endpoint) => {
                    desired_grpc.insert(mock.id.clone(), endpoint.clone());
                }
                _ => {}
            }
        }

        // Tear down listeners whose mock is gone or disabled.
        {
            let mut brokers = self.mqtt.lock();
            brokers.retain(|id, broker| {
                let keep = desired_mqtt.contains_key(id);
                if !keep {
                    info!(mock_id = %id, "stopping mqtt broker");
                    broker.shutdown();
                }
                keep
            });
        }
        {
            let mut servers = self.grpc.lock();
            servers.retain(|id, server| {
                let keep = desired_grpc.contains_key(id);
                if !keep {
                    info!(mock_id = %id, "stopping grpc server");
                    server.shutdown();
                }
                keep
            });
        }

        // Spawn listeners for new endpoint mocks. Startup is async; the
        // spawned task re-checks the desired set before installing, so a
        // mock deleted mid-start is torn down immediately.
        let running_mqtt: HashSet<String> = self.mqtt.lock().keys().cloned().collect();
        for (mock_id, endpoint) in desired_mqtt {
            if running_mqtt.contains(&mock_id) {
                continue;
            }
            let supervisor = Arc::clone(self);
            tokio::spawn(async move {
                match MqttBroker::start(endpoint, supervisor.metrics.clone()).await {
                    Ok(broker) => {
                        let broker = Arc::new(broker);
                        let still_wanted = supervisor
                            .registry
                            .get(&mock_id)
                            .is_some_and(|m| m.is_enabled());
                        if still_wanted {
                            supervisor.mqtt.lock().insert(mock_id, broker);
                        } else {
                            broker.shutdown();
                        }
                    }
                    Err(e) => warn!(mock_id = %mock_id, error = %e, "mqtt broker failed to start"),
                }
            });
        }

        let running_grpc: HashSet<String> = self.grpc.lock().keys().cloned().collect();
        for (mock_id, endpoint) in desired_grpc {
            if running_grpc.contains(&mock_id) {
                continue;
            }
            let supervisor = Arc::clone(self);
            tokio::spawn(async move {
                match GrpcMockServer::start(&endpoint).await {
                    Ok(server) => {
                        let server = Arc::new(server);
                        let still_wanted = supervisor
                            .registry
                            .get(&mock_id)
                            .is_some_and(|m| m.is_enabled());
                        if still_wanted {
                            supervisor.grpc.lock().insert(mock_id, server);
                        } else {
                            server.shutdown();
                        }
                    }
                    Err(e) => warn!(mock_id = %mock_id, error = %e, "grpc server failed to start"),
                }
            });
        }
    }

    /// Cancel every long-lived protocol loop
    pub fn shutdown_all(&self) {
        for (_, broker) in self.mqtt.lock().drain() {
            broker.shutdown();
        }
        for (_, server) in self.grpc.lock().drain() {
            server.shutdown();
        }
    }
}

// The listener holds a weak handle: registry subscriptions must not keep
// the supervisor alive past server shutdown.
struct SupervisorListener(std::sync::Weak<Supervisor>);

impl RegistryListener for SupervisorListener {
    fn on_event(&self, _event: &RegistryEvent) {
        if let Some(supervisor) = self.0.upgrade() {
            supervisor.sync();
        }
    }
}
