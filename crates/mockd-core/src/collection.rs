//! Canonical mock-collection format
//!
//! The interchange document for import/export: `version`, `kind`, metadata,
//! the mock list, standalone WebSocket endpoints, and stateful resource
//! declarations. JSON and YAML render the same field names.

use crate::model::{Mock, MockSpec, ResourceSpec, WsEndpoint};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Format version accepted by this engine
pub const COLLECTION_VERSION: &str = "1.0";
/// Document kind marker
pub const COLLECTION_KIND: &str = "MockCollection";

/// Collection metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Any extra metadata is preserved round-trip
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// The canonical interchange document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockCollection {
    pub version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: CollectionMetadata,
    #[serde(default)]
    pub mocks: Vec<Mock>,
    /// Standalone endpoint payloads; wrapped into ws mocks on import
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_socket_endpoints: Vec<WsEndpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stateful_resources: Vec<ResourceSpec>,
}

impl Default for MockCollection {
    fn default() -> Self {
        Self::new("")
    }
}

impl MockCollection {
    /// Create an empty collection with the given name
    pub fn new(name: &str) -> Self {
        Self {
            version: COLLECTION_VERSION.to_string(),
            kind: COLLECTION_KIND.to_string(),
            metadata: CollectionMetadata {
                name: name.to_string(),
                ..CollectionMetadata::default()
            },
            mocks: Vec::new(),
            web_socket_endpoints: Vec::new(),
            stateful_resources: Vec::new(),
        }
    }

    /// Check version/kind markers
    pub fn validate(&self) -> Result<()> {
        if self.kind != COLLECTION_KIND {
            return Err(Error::validation_field(
                format!("unsupported document kind '{}'", self.kind),
                "kind",
            ));
        }
        if self.version != COLLECTION_VERSION {
            return Err(Error::validation_field(
                format!("unsupported collection version '{}'", self.version),
                "version",
            ));
        }
        for mock in &self.mocks {
            mock.validate()?;
        }
        for resource in &self.stateful_resources {
            resource.validate()?;
        }
        Ok(())
    }

    /// All mocks including standalone WebSocket endpoints wrapped as mocks
    pub fn into_mocks(self) -> Vec<Mock> {
        let mut mocks = self.mocks;
        mocks.extend(self.web_socket_endpoints.into_iter().map(|endpoint| {
            let name = endpoint.path.clone();
            let mut mock = Mock::new(MockSpec::Ws(endpoint));
            mock.name = name;
            mock
        }));
        mocks
    }

    /// Parse from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidJson {
            message: e.to_string(),
        })
    }

    /// Parse from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::validation(e.to_string()))
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
