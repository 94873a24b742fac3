//! Canonical mock data model shared by every protocol adapter
//!
//! A [`Mock`] is the unit owned by the registry: identity, display name,
//! enabled flag, and exactly one protocol-specific payload. Adapters pattern
//! match on [`MockSpec`] rather than poking at optional fields.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Protocol discriminator for a mock definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockKind {
    #[default]
    Http,
    Ws,
    Mqtt,
    Grpc,
    Graphql,
}

impl MockKind {
    /// Lowercase name as used in filters and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Ws => "ws",
            Self::Mqtt => "mqtt",
            Self::Grpc => "grpc",
            Self::Graphql => "graphql",
        }
    }
}

impl std::str::FromStr for MockKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "http" => Ok(Self::Http),
            "ws" => Ok(Self::Ws),
            "mqtt" => Ok(Self::Mqtt),
            "grpc" => Ok(Self::Grpc),
            "graphql" => Ok(Self::Graphql),
            other => Err(Error::validation_field(
                format!("unknown mock type '{other}'"),
                "type",
            )),
        }
    }
}

/// Protocol-specific payload of a mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockSpec {
    Http(HttpMock),
    Ws(WsEndpoint),
    Mqtt(MqttEndpoint),
    Grpc(GrpcEndpoint),
    Graphql(GraphqlEndpoint),
}

impl MockSpec {
    /// The discriminator matching this payload
    pub fn kind(&self) -> MockKind {
        match self {
            Self::Http(_) => MockKind::Http,
            Self::Ws(_) => MockKind::Ws,
            Self::Mqtt(_) => MockKind::Mqtt,
            Self::Grpc(_) => MockKind::Grpc,
            Self::Graphql(_) => MockKind::Graphql,
        }
    }
}

/// A mock definition: the canonical unit stored in the registry
#[derive(Debug, Clone, PartialEq)]
pub struct Mock {
    /// Stable identifier; server-assigned when created empty
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional free-text description, preserved by import/export
    pub description: Option<String>,
    /// Tri-state enabled flag; unset means enabled
    pub enabled: Option<bool>,
    /// Exactly one protocol payload
    pub spec: MockSpec,
}

impl Mock {
    /// Create a mock with an empty (to-be-assigned) id
    pub fn new(spec: MockSpec) -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: None,
            enabled: None,
            spec,
        }
    }

    /// Effective enabled state (unset defaults to true)
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Protocol discriminator
    pub fn kind(&self) -> MockKind {
        self.spec.kind()
    }

    /// Validate the definition, returning the first structural problem
    pub fn validate(&self) -> Result<()> {
        match &self.spec {
            MockSpec::Http(m) => m.validate(),
            MockSpec::Ws(e) => e.validate(),
            MockSpec::Mqtt(e) => e.validate(),
            MockSpec::Grpc(e) => e.validate(),
            MockSpec::Graphql(e) => e.validate(),
        }
    }
}

// Wire shape: `{"type": "http", "http": {...}}`. The payload field is named
// after the discriminator, so (de)serialization goes through an intermediate
// struct with one optional slot per protocol.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockWire {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(rename = "type")]
    kind: MockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http: Option<HttpMock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ws: Option<WsEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mqtt: Option<MqttEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grpc: Option<GrpcEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    graphql: Option<GraphqlEndpoint>,
}

impl Serialize for Mock {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut wire = MockWire {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            enabled: self.enabled,
            kind: self.kind(),
            ..MockWire::default()
        };
        match &self.spec {
            MockSpec::Http(m) => wire.http = Some(m.clone()),
            MockSpec::Ws(e) => wire.ws = Some(e.clone()),
            MockSpec::Mqtt(e) => wire.mqtt = Some(e.clone()),
            MockSpec::Grpc(e) => wire.grpc = Some(e.clone()),
            MockSpec::Graphql(e) => wire.graphql = Some(e.clone()),
        }
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Mock {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = MockWire::deserialize(deserializer)?;
        let missing = |field: &str| {
            serde::de::Error::custom(format!(
                "mock of type '{}' requires the '{}' payload",
                wire.kind.as_str(),
                field
            ))
        };
        let spec = match wire.kind {
            MockKind::Http => MockSpec::Http(wire.http.ok_or_else(|| missing("http"))?),
            MockKind::Ws => MockSpec::Ws(wire.ws.ok_or_else(|| missing("ws"))?),
            MockKind::Mqtt => MockSpec::Mqtt(wire.mqtt.ok_or_else(|| missing("mqtt"))?),
            MockKind::Grpc => MockSpec::Grpc(wire.grpc.ok_or_else(|| missing("grpc"))?),
            MockKind::Graphql => {
                MockSpec::Graphql(wire.graphql.ok_or_else(|| missing("graphql"))?)
            }
        };
        Ok(Self {
            id: wire.id,
            name: wire.name,
            description: wire.description,
            enabled: wire.enabled,
            spec,
        })
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// HTTP mock payload: a matcher plus a response spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMock {
    pub matcher: HttpMatcher,
    pub response: HttpResponseSpec,
    /// Higher priority wins among mocks matching the same request
    #[serde(default)]
    pub priority: i32,
}

impl HttpMock {
    fn validate(&self) -> Result<()> {
        if self.matcher.path.is_empty() {
            return Err(Error::validation_field("matcher path is required", "http.matcher.path"));
        }
        if !self.matcher.path.starts_with('/') {
            return Err(Error::validation_field(
                "matcher path must start with '/'",
                "http.matcher.path",
            ));
        }
        if let Some(BodyMatcher::Regex { pattern }) = &self.matcher.body {
            regex::Regex::new(pattern)?;
        }
        if self.response.status_code < 100 || self.response.status_code > 599 {
            return Err(Error::validation_field(
                format!("status code {} out of range", self.response.status_code),
                "http.response.statusCode",
            ));
        }
        Ok(())
    }
}

/// Request predicate for an HTTP mock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatcher {
    /// HTTP method; any method matches when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Path pattern: literal, `*` one segment, `**` any number, `:name` param
    pub path: String,
    /// All listed headers must be present with exactly these values
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// All listed query params must be present with exactly these values
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub query: HashMap<String, String>,
    /// Optional body predicate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyMatcher>,
}

/// Body predicate variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BodyMatcher {
    /// Exact string equality
    Exact { value: String },
    /// Substring containment
    Contains { value: String },
    /// JSON equality, optionally scoped to a `/`-separated pointer
    JsonEquals {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pointer: Option<String>,
    },
    /// Regex over the raw body
    Regex { pattern: String },
}

/// Response half of an HTTP mock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponseSpec {
    #[serde(default = "default_status")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Body template; rendered fresh per request
    #[serde(default)]
    pub body: String,
    /// Delay before the first body byte
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// When set, the response is a server-sent event stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<SseEvent>>,
}

impl Default for HttpResponseSpec {
    fn default() -> Self {
        Self {
            status_code: default_status(),
            headers: HashMap::new(),
            body: String::new(),
            delay_ms: None,
            events: None,
        }
    }
}

fn default_status() -> u16 {
    200
}

/// One event of an SSE response stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SseEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Delay before this event is written
    #[serde(default)]
    pub delay_ms: u64,
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// WebSocket endpoint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEndpoint {
    pub path: String,
    /// Echo unmatched messages back when no default response is set
    #[serde(default)]
    pub echo_mode: bool,
    /// Ordered message matchers; first match wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<WsMatcher>,
    /// Response for unmatched messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_response: Option<String>,
    /// Steps executed immediately after accept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Vec<ScenarioStep>>,
    /// Offered subprotocols
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subprotocols: Vec<String>,
    /// Reject connections that do not negotiate a listed subprotocol
    #[serde(default)]
    pub require_subprotocol: bool,
    /// Connection cap; 0 rejects everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<HeartbeatConfig>,
}

impl WsEndpoint {
    fn validate(&self) -> Result<()> {
        if self.path.is_empty() || !self.path.starts_with('/') {
            return Err(Error::validation_field(
                "websocket path must start with '/'",
                "ws.path",
            ));
        }
        if self.require_subprotocol && self.subprotocols.is_empty() {
            return Err(Error::validation_field(
                "requireSubprotocol needs a non-empty subprotocol list",
                "ws.subprotocols",
            ));
        }
        for m in &self.matchers {
            m.rule.validate()?;
        }
        if let Some(hb) = &self.heartbeat {
            if hb.interval_ms == 0 {
                return Err(Error::validation_field(
                    "heartbeat interval must be positive",
                    "ws.heartbeat.intervalMs",
                ));
            }
        }
        Ok(())
    }
}

/// A message matcher with its scripted response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsMatcher {
    #[serde(flatten)]
    pub rule: WsMatchRule,
    /// Response template sent on match
    pub response: String,
}

/// Predicate over an inbound WebSocket message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "camelCase")]
pub enum WsMatchRule {
    Exact { value: String },
    Contains { value: String },
    Regex { pattern: String },
    /// JSON pointer equality on text frames
    JsonPointer { pointer: String, value: Value },
    /// Hex-encoded prefix match on binary frames
    BinaryPrefix { prefix_hex: String },
}

impl WsMatchRule {
    fn validate(&self) -> Result<()> {
        match self {
            Self::Regex { pattern } => {
                regex::Regex::new(pattern)?;
            }
            Self::BinaryPrefix { prefix_hex } => {
                if prefix_hex.len() % 2 != 0
                    || !prefix_hex.chars().all(|c| c.is_ascii_hexdigit())
                {
                    return Err(Error::validation_field(
                        "binaryPrefix must be an even-length hex string",
                        "ws.matchers.prefixHex",
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// One step of a connect-time scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum ScenarioStep {
    /// Send a templated message
    Send { message: String },
    /// Sleep
    Wait { duration_ms: u64 },
    /// Await a client message, optionally matching a rule
    Receive {
        #[serde(default, flatten)]
        rule: Option<WsMatchRule>,
        #[serde(default = "default_receive_timeout")]
        timeout_ms: u64,
    },
    /// Alias of `receive` kept for configuration compatibility
    Expect {
        #[serde(default, flatten)]
        rule: Option<WsMatchRule>,
        #[serde(default = "default_receive_timeout")]
        timeout_ms: u64,
    },
    /// Join a broadcast group
    Join { group: String },
    /// Leave a broadcast group
    Leave { group: String },
    /// Close the connection
    Close {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

fn default_receive_timeout() -> u64 {
    5_000
}

/// Heartbeat ping/pong configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

fn default_heartbeat_timeout() -> u64 {
    10_000
}

// ---------------------------------------------------------------------------
// MQTT
// ---------------------------------------------------------------------------

/// MQTT endpoint payload: an embedded broker plus publish behaviors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttEndpoint {
    /// Listen port; 0 asks the OS for one
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<MqttAuth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auto_publish: Vec<AutoPublishTopic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_publish: Vec<OnPublishRule>,
    /// Request/response rules with `{n}` wildcard substitution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<MockResponseRule>,
}

impl MqttEndpoint {
    fn validate(&self) -> Result<()> {
        for topic in &self.auto_publish {
            if topic.topic.is_empty() {
                return Err(Error::validation_field(
                    "autoPublish topic is required",
                    "mqtt.autoPublish.topic",
                ));
            }
            if topic.qos > 2 {
                return Err(Error::validation_field(
                    format!("invalid QoS {}", topic.qos),
                    "mqtt.autoPublish.qos",
                ));
            }
            if topic.messages.is_empty() {
                return Err(Error::validation_field(
                    "autoPublish needs at least one message",
                    "mqtt.autoPublish.messages",
                ));
            }
        }
        for rule in &self.on_publish {
            if rule.response.is_none() && rule.forward_to.is_none() {
                return Err(Error::validation_field(
                    "onPublish rule needs a response or a forwardTo topic",
                    "mqtt.onPublish",
                ));
            }
        }
        Ok(())
    }
}

/// Broker authentication policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MqttAuth {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<MqttUser>,
}

/// One username/password entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttUser {
    pub username: String,
    pub password: String,
}

/// Auto-publish configuration for one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPublishTopic {
    pub topic: String,
    #[serde(default)]
    pub qos: u8,
    /// Ordered messages, published cyclically when `repeat` is set
    pub messages: Vec<AutoPublishMessage>,
}

/// One message in an auto-publish loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPublishMessage {
    /// Payload template; rendered per emission
    pub payload: String,
    #[serde(default = "default_publish_interval")]
    pub interval_ms: u64,
    #[serde(default)]
    pub repeat: bool,
}

fn default_publish_interval() -> u64 {
    1_000
}

/// React to an inbound publish: respond on the same topic or forward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnPublishRule {
    /// Topic filter with standard `+`/`#` wildcards
    pub trigger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_to: Option<String>,
}

/// Request/response rule: reply on a derived topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockResponseRule {
    /// Trigger filter; `+` captures feed `{n}` substitution
    pub trigger: String,
    /// Response topic; `{1}`..`{n}` substitute the captures
    pub response_topic: String,
    /// Payload template
    pub payload: String,
}

// ---------------------------------------------------------------------------
// gRPC
// ---------------------------------------------------------------------------

/// gRPC endpoint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpcEndpoint {
    #[serde(default)]
    pub port: u16,
    /// Path to the .proto file compiled at registration time
    pub proto_file: String,
    /// `package.Service/Method` -> behavior
    #[serde(default)]
    pub methods: HashMap<String, GrpcMethodMock>,
}

impl GrpcEndpoint {
    fn validate(&self) -> Result<()> {
        if self.proto_file.is_empty() {
            return Err(Error::validation_field(
                "protoFile is required",
                "grpc.protoFile",
            ));
        }
        for (name, method) in &self.methods {
            if method.error.is_none() && method.response.is_none() && method.responses.is_empty() {
                return Err(Error::validation_field(
                    format!("method '{name}' needs a response, responses, or error"),
                    "grpc.methods",
                ));
            }
        }
        Ok(())
    }
}

/// Configured behavior for one gRPC method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GrpcMethodMock {
    /// Unary / client-streaming response message (JSON form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Server-streaming / bidi response messages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<Value>,
    /// Delay between streamed messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_delay_ms: Option<u64>,
    /// When set, the method fails with this status instead of responding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GrpcErrorMock>,
}

/// Canonical-status error for a gRPC method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpcErrorMock {
    /// Canonical status name, e.g. `NOT_FOUND`, `PERMISSION_DENIED`
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// GraphQL
// ---------------------------------------------------------------------------

/// GraphQL endpoint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlEndpoint {
    #[serde(default = "default_graphql_path")]
    pub path: String,
    /// SDL schema text
    pub schema: String,
    /// Allow `__schema` / `__type` / `__typename` queries
    #[serde(default)]
    pub introspection: bool,
    /// `TypeName.fieldName` -> resolver
    #[serde(default)]
    pub resolvers: HashMap<String, GraphqlResolver>,
}

fn default_graphql_path() -> String {
    "/graphql".to_string()
}

impl GraphqlEndpoint {
    fn validate(&self) -> Result<()> {
        if self.schema.trim().is_empty() {
            return Err(Error::validation_field(
                "schema SDL is required",
                "graphql.schema",
            ));
        }
        for (key, resolver) in &self.resolvers {
            if !key.contains('.') {
                return Err(Error::validation_field(
                    format!("resolver key '{key}' must be 'Type.field'"),
                    "graphql.resolvers",
                ));
            }
            if resolver.response.is_none() && resolver.error.is_none() {
                return Err(Error::validation_field(
                    format!("resolver '{key}' needs a response or an error"),
                    "graphql.resolvers",
                ));
            }
        }
        Ok(())
    }
}

/// Configured behavior for one GraphQL field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlResolver {
    /// Templated response value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Structured error appended to the `errors` array (field resolves null)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GraphqlErrorMock>,
}

/// GraphQL field error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlErrorMock {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

// ---------------------------------------------------------------------------
// Stateful resources
// ---------------------------------------------------------------------------

/// ID assignment mode for stateful resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdMode {
    /// Random UUIDv4 ids
    #[default]
    Uuid,
    /// `{resource}-{n}` monotonic ids
    Sequential,
}

/// Declaration of a stateful REST resource collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub name: String,
    /// Base path; may contain `:param` segments for nesting
    pub base_path: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Field linking an item to its parent resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_field: Option<String>,
    /// Items restored on reset
    #[serde(default)]
    pub seed: Vec<Value>,
    #[serde(default)]
    pub id_mode: IdMode,
}

fn default_id_field() -> String {
    "id".to_string()
}

impl ResourceSpec {
    /// Validate the declaration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation_field("resource name is required", "name"));
        }
        if !self.base_path.starts_with('/') {
            return Err(Error::validation_field(
                "basePath must start with '/'",
                "basePath",
            ));
        }
        for item in &self.seed {
            if !item.is_object() {
                return Err(Error::validation_field(
                    "seed items must be JSON objects",
                    "seed",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mock_wire_round_trip() {
        let raw = json!({
            "id": "mk_1",
            "type": "http",
            "enabled": true,
            "http": {
                "matcher": {"method": "GET", "path": "/api/users"},
                "response": {"statusCode": 200, "body": "[]"}
            }
        });
        let mock: Mock = serde_json::from_value(raw).unwrap();
        assert_eq!(mock.kind(), MockKind::Http);
        assert!(mock.is_enabled());
        let back = serde_json::to_value(&mock).unwrap();
        assert_eq!(back["type"], "http");
        assert_eq!(back["http"]["response"]["statusCode"], 200);
        let again: Mock = serde_json::from_value(back).unwrap();
        assert_eq!(again, mock);
    }

    #[test]
    fn mock_missing_payload_rejected() {
        let raw = json!({"type": "ws"});
        let err = serde_json::from_value::<Mock>(raw).unwrap_err();
        assert!(err.to_string().contains("'ws' payload"));
    }

    #[test]
    fn unset_enabled_defaults_to_true() {
        let mock = Mock::new(MockSpec::Http(HttpMock {
            matcher: HttpMatcher {
                path: "/x".into(),
                ..HttpMatcher::default()
            },
            response: HttpResponseSpec::default(),
            priority: 0,
        }));
        assert_eq!(mock.enabled, None);
        assert!(mock.is_enabled());
    }

    #[test]
    fn http_validation_catches_bad_status() {
        let mock = Mock::new(MockSpec::Http(HttpMock {
            matcher: HttpMatcher {
                path: "/x".into(),
                ..HttpMatcher::default()
            },
            response: HttpResponseSpec {
                status_code: 999,
                ..HttpResponseSpec::default()
            },
            priority: 0,
        }));
        assert!(mock.validate().is_err());
    }

    #[test]
    fn ws_scenario_steps_round_trip() {
        let raw = json!([
            {"step": "send", "message": "hello"},
            {"step": "wait", "durationMs": 50},
            {"step": "receive", "match": "exact", "value": "ack", "timeoutMs": 100},
            {"step": "close", "code": 1000}
        ]);
        let steps: Vec<ScenarioStep> = serde_json::from_value(raw).unwrap();
        assert_eq!(steps.len(), 4);
        assert!(matches!(&steps[2], ScenarioStep::Receive { rule: Some(WsMatchRule::Exact { .. }), .. }));
    }

    #[test]
    fn grpc_method_without_behavior_rejected() {
        let mut methods = HashMap::new();
        methods.insert("pkg.Svc/Do".to_string(), GrpcMethodMock::default());
        let endpoint = GrpcEndpoint {
            port: 0,
            proto_file: "svc.proto".into(),
            methods,
        };
        assert!(endpoint.validate().is_err());
    }
}
