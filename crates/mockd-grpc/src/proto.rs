//! Proto file compilation and service discovery
//!
//! Compiles `.proto` sources in-process (no protoc binary) into a
//! descriptor pool, then extracts service and method shapes for dispatch.

use mockd_core::{Error, Result};
use prost_reflect::{DescriptorPool, MethodDescriptor};
use std::path::Path;
use tracing::info;

/// A discovered service
#[derive(Debug, Clone)]
pub struct ProtoService {
    /// Fully qualified name, e.g. `demo.greeter.Greeter`
    pub name: String,
    pub methods: Vec<ProtoMethod>,
}

/// A discovered method with its streaming shape
#[derive(Debug, Clone)]
pub struct ProtoMethod {
    pub name: String,
    pub input_type: String,
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

/// A compiled schema: descriptor pool plus the extracted service list
#[derive(Clone, Debug)]
pub struct GrpcSchema {
    pool: DescriptorPool,
    services: Vec<ProtoService>,
}

impl GrpcSchema {
    /// Compile one proto file (includes resolve against its directory)
    pub fn from_file(proto_file: &str) -> Result<Self> {
        let path = Path::new(proto_file);
        let include = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_set = protox::compile([path], [include, Path::new(".")])
            .map_err(|e| Error::validation_field(format!("proto compile failed: {e}"), "protoFile"))?;
        let pool = DescriptorPool::from_file_descriptor_set(file_set)
            .map_err(|e| Error::validation(format!("descriptor pool: {e}")))?;

        let services = pool
            .services()
            .map(|service| ProtoService {
                name: service.full_name().to_string(),
                methods: service
                    .methods()
                    .map(|method| ProtoMethod {
                        name: method.name().to_string(),
                        input_type: method.input().full_name().to_string(),
                        output_type: method.output().full_name().to_string(),
                        client_streaming: method.is_client_streaming(),
                        server_streaming: method.is_server_streaming(),
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();
        info!(
            file = proto_file,
            services = services.len(),
            "compiled proto schema"
        );
        Ok(Self { pool, services })
    }

    /// Discovered services
    pub fn services(&self) -> &[ProtoService] {
        &self.services
    }

    /// Find a method descriptor by service full name and method name
    pub fn method(&self, service: &str, method: &str) -> Option<MethodDescriptor> {
        self.pool
            .get_service_by_name(service)
            .and_then(|s| s.methods().find(|m| m.name() == method))
    }

    /// The descriptor pool
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

#[cfg(test)]
pub(crate) const GREETER_PROTO: &str = r#"
syntax = "proto3";
package demo.greeter;

message HelloRequest {
  string name = 1;
}

message HelloReply {
  string message = 1;
  int32 count = 2;
}

service Greeter {
  rpc SayHello (HelloRequest) returns (HelloReply);
  rpc SayHelloStream (HelloRequest) returns (stream HelloReply);
  rpc CollectHellos (stream HelloRequest) returns (HelloReply);
  rpc Chat (stream HelloRequest) returns (stream HelloReply);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn write_greeter() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("greeter.proto")).unwrap();
        file.write_all(GREETER_PROTO.as_bytes()).unwrap();
        dir
    }

    #[test]
    fn compiles_and_extracts_services() {
        let dir = write_greeter();
        let path = dir.path().join("greeter.proto");
        let schema = GrpcSchema::from_file(path.to_str().unwrap()).unwrap();

        assert_eq!(schema.services().len(), 1);
        let service = &schema.services()[0];
        assert_eq!(service.name, "demo.greeter.Greeter");
        assert_eq!(service.methods.len(), 4);

        let say_hello = &service.methods[0];
        assert_eq!(say_hello.name, "SayHello");
        assert!(!say_hello.client_streaming);
        assert!(!say_hello.server_streaming);

        let stream = &service.methods[1];
        assert!(stream.server_streaming);

        let chat = &service.methods[3];
        assert!(chat.client_streaming && chat.server_streaming);
    }

    #[test]
    fn method_lookup() {
        let dir = write_greeter();
        let path = dir.path().join("greeter.proto");
        let schema = GrpcSchema::from_file(path.to_str().unwrap()).unwrap();
        assert!(schema.method("demo.greeter.Greeter", "SayHello").is_some());
        assert!(schema.method("demo.greeter.Greeter", "Nope").is_none());
        assert!(schema.method("other.Service", "SayHello").is_none());
    }

    #[test]
    fn missing_file_is_a_validation_error() {
        let err = GrpcSchema::from_file("/nonexistent/x.proto").unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
}
