//! Server configuration
//!
//! Loaded from a YAML file or built programmatically. Ports set to 0 are
//! OS-assigned; read the bound addresses back from the running server.

use mockd_chaos::ChaosConfig;
use mockd_core::collection::MockCollection;
use mockd_core::model::ResourceSpec;
use mockd_core::{Error, Result};
use mockd_http::CorsConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_log_capacity() -> usize {
    1_000
}

fn default_grace_ms() -> u64 {
    10_000
}

/// Top-level mockd server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Mock-traffic port (0 = OS-assigned)
    #[serde(default)]
    pub http_port: u16,
    /// Admin port (0 = OS-assigned)
    #[serde(default)]
    pub admin_port: u16,
    /// Engine-local control port; disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_port: Option<u16>,
    /// Admin API key; unset disables the gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_log_capacity")]
    pub request_log_capacity: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsConfig>,
    /// Path prefixes excluded from tracing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_skip: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaos: Option<ChaosConfig>,
    /// Drain budget during shutdown
    #[serde(default = "default_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Stateful resources registered at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stateful_resources: Vec<ResourceSpec>,
    /// Initial mock collection loaded at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<MockCollection>,
}

impl ServerConfig {
    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate embedded sections
    pub fn validate(&self) -> Result<()> {
        if let Some(chaos) = &self.chaos {
            chaos.validate()?;
        }
        if let Some(collection) = &self.collection {
            collection.validate()?;
        }
        for resource in &self.stateful_resources {
            resource.validate()?;
        }
        if self.request_log_capacity == 0 {
            return Err(Error::validation_field(
                "requestLogCapacity must be positive",
                "requestLogCapacity",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_round_trip_with_defaults() {
        let yaml = r#"
httpPort: 8080
adminPort: 9080
apiKey: test-key
chaos:
  enabled: true
  globalRules:
    latency:
      min: 100
      max: 200
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.request_log_capacity, 1_000);
        assert_eq!(config.shutdown_grace_ms, 10_000);
        assert!(config.chaos.as_ref().unwrap().enabled);
        config.validate().unwrap();
    }

    #[test]
    fn invalid_chaos_rejected() {
        let yaml = r#"
chaos:
  enabled: true
  globalRules:
    - type: emptyResponse
      probability: 3.0
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
