//! # mockd mqtt
//!
//! The MQTT broker adapter: an embedded MQTT 3.1.1 broker per configured
//! endpoint with topic-driven auto-publish loops, on-publish respond/forward
//! rules, and request/response rules with `{n}` wildcard substitution in
//! response topics. Payloads are template-rendered per emission.

pub mod broker;
pub mod codec;
pub mod topics;

pub use broker::MqttBroker;
pub use codec::{ConnackCode, Packet, ProtocolError};
pub use topics::{match_filter, substitute_captures, TopicTree};
