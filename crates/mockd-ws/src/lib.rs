//! # mockd ws
//!
//! The WebSocket manager: per-endpoint connection sets, ordered message
//! matchers with scripted responses, connect-time scenarios, broadcast
//! groups, heartbeats, and the admin operations over all of it.
//!
//! Endpoints come from the mock registry; [`WsManager::sync`] reconciles the
//! live endpoint table against a registry snapshot, and [`WsHook`] plugs the
//! manager into the HTTP traffic port's dispatch chain so upgrades reach it
//! without router rebuilds.

pub mod manager;
pub mod matching;
pub mod scenario;

pub use manager::{
    ConnectionHandle, ConnectionInfo, EndpointStats, Outbound, WsHook, WsManager, WsStats,
    CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, SEND_QUEUE_CAP,
};
