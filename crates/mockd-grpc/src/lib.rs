//! # mockd grpc
//!
//! The gRPC adapter: compiles an endpoint's `.proto` file in-process,
//! then reflectively dispatches any RPC on the port to the configured
//! behavior. Unary, server-streaming, client-streaming, and bidirectional
//! methods are all served through a dynamic-message codec; configured
//! errors map to canonical status codes and unconfigured methods return
//! `UNIMPLEMENTED`.

pub mod codec;
pub mod proto;
pub mod server;
pub mod service;

pub use codec::DynamicCodec;
pub use proto::{GrpcSchema, ProtoMethod, ProtoService};
pub use server::GrpcMockServer;
pub use service::{code_from_name, MockGrpcService};
