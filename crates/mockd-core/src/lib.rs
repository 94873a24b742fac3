//! # mockd core
//!
//! Shared engine for the mockd mock-service platform: the mock registry and
//! data model, the HTTP matcher engine, response templating, the stateful
//! resource engine, and the request log.
//!
//! Protocol adapters (HTTP, WebSocket, MQTT, gRPC, GraphQL) consume this
//! crate: they subscribe to registry change events, pattern match on the
//! mock payload variants, and render responses through the template engine.
//!
//! ## Quick start
//!
//! ```rust
//! use mockd_core::model::{HttpMatcher, HttpMock, HttpResponseSpec, Mock, MockSpec};
//! use mockd_core::registry::MockRegistry;
//!
//! let registry = MockRegistry::new();
//! let mock = Mock::new(MockSpec::Http(HttpMock {
//!     matcher: HttpMatcher {
//!         method: Some("GET".into()),
//!         path: "/api/users".into(),
//!         ..HttpMatcher::default()
//!     },
//!     response: HttpResponseSpec {
//!         body: "[]".into(),
//!         ..HttpResponseSpec::default()
//!     },
//!     priority: 0,
//! }));
//! let created = registry.create(mock).unwrap();
//! assert!(created.id.starts_with("mk_"));
//! ```

pub mod collection;
pub mod error;
pub mod matcher;
pub mod model;
pub mod registry;
pub mod request_log;
pub mod resources;
pub mod template;

pub use collection::MockCollection;
pub use error::{Error, Result};
pub use matcher::{MatchResult, MatcherIndex, PathPattern, RequestFacts};
pub use model::{Mock, MockKind, MockSpec};
pub use registry::{ListFilter, MockRegistry, RegistryEvent, RegistryListener, RegistrySnapshot};
pub use request_log::{LogQuery, RequestLog, RequestLogEntry};
pub use resources::{ListParams, ResourcePage, ResourceStore};
pub use template::{RenderContext, Template};
