//! Chaos configuration
//!
//! An enabled flag, a global fault list, and ordered per-path rules. Faults
//! accept two wire shapes: an ordered list of tagged variants, or a keyed
//! object (`{"latency": {...}, "error": {...}}`) which expands into the
//! documented application order.

use mockd_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Milliseconds that also deserialize from strings like `"200ms"` or `"2s"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct DurationMs(pub u64);

impl DurationMs {
    /// As a std duration
    pub fn duration(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl From<u64> for DurationMs {
    fn from(ms: u64) -> Self {
        Self(ms)
    }
}

impl Serialize for DurationMs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for DurationMs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Self(ms)),
            Raw::Text(text) => parse_duration_ms(&text)
                .map(Self)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{text}'"))),
        }
    }
}

fn parse_duration_ms(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Ok(ms) = text.parse::<u64>() {
        return Some(ms);
    }
    let (value, unit) = text.split_at(text.find(|c: char| c.is_ascii_alphabetic())?);
    let value: f64 = value.trim().parse().ok()?;
    let factor = match unit.trim() {
        "ms" => 1.0,
        "s" => 1_000.0,
        "m" => 60_000.0,
        _ => return None,
    };
    Some((value * factor) as u64)
}

fn default_probability() -> f64 {
    1.0
}

fn default_corrupt_rate() -> f64 {
    0.1
}

fn default_timeout() -> DurationMs {
    DurationMs(30_000)
}

/// A single chaos effect with its own activation probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Fault {
    /// Sleep uniformly in `[min, max]` before the response renders
    #[serde(rename_all = "camelCase")]
    Latency {
        min: DurationMs,
        max: DurationMs,
        #[serde(default = "default_probability")]
        probability: f64,
    },
    /// Short-circuit with an error status
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(default = "default_probability")]
        probability: f64,
        /// Default status when no list is given; 500 when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_code: Option<u16>,
        /// Sampled uniformly when non-empty
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        status_codes: Vec<u16>,
    },
    /// Hold the request until the timeout elapses, then fail
    #[serde(rename_all = "camelCase")]
    Timeout {
        #[serde(default = "default_probability")]
        probability: f64,
        #[serde(default = "default_timeout")]
        duration: DurationMs,
    },
    /// Flip bits in a fraction of body bytes
    #[serde(rename_all = "camelCase")]
    CorruptBody {
        #[serde(default = "default_corrupt_rate")]
        rate: f64,
        #[serde(default = "default_probability")]
        probability: f64,
    },
    /// Drop the body, keeping status and headers
    #[serde(rename_all = "camelCase")]
    EmptyResponse {
        #[serde(default = "default_probability")]
        probability: f64,
    },
    /// Trickle the body at a byte rate
    #[serde(rename_all = "camelCase")]
    SlowBody {
        bytes_per_second: u64,
        #[serde(default = "default_probability")]
        probability: f64,
    },
    /// Abort the transport abruptly
    #[serde(rename_all = "camelCase")]
    ConnectionReset {
        #[serde(default = "default_probability")]
        probability: f64,
    },
    /// Truncate the body after a byte budget
    #[serde(rename_all = "camelCase")]
    PartialResponse {
        max_bytes: usize,
        #[serde(default = "default_probability")]
        probability: f64,
    },
    /// Throttle writes to a byte rate
    #[serde(rename_all = "camelCase")]
    Bandwidth {
        bytes_per_second: u64,
        #[serde(default = "default_probability")]
        probability: f64,
    },
}

impl Fault {
    /// This fault's activation probability
    pub fn probability(&self) -> f64 {
        match self {
            Self::Latency { probability, .. }
            | Self::Error { probability, .. }
            | Self::Timeout { probability, .. }
            | Self::CorruptBody { probability, .. }
            | Self::EmptyResponse { probability }
            | Self::SlowBody { probability, .. }
            | Self::ConnectionReset { probability }
            | Self::PartialResponse { probability, .. }
            | Self::Bandwidth { probability, .. } => *probability,
        }
    }

    /// Stable name used for stats and metrics labels
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Latency { .. } => "latency",
            Self::Error { .. } => "error",
            Self::Timeout { .. } => "timeout",
            Self::CorruptBody { .. } => "corrupt_body",
            Self::EmptyResponse { .. } => "empty_response",
            Self::SlowBody { .. } => "slow_body",
            Self::ConnectionReset { .. } => "connection_reset",
            Self::PartialResponse { .. } => "partial_response",
            Self::Bandwidth { .. } => "bandwidth",
        }
    }

    fn validate(&self) -> Result<()> {
        let p = self.probability();
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::validation(format!(
                "fault probability {p} outside [0,1]"
            )));
        }
        match self {
            Self::Latency { min, max, .. } if max < min => Err(Error::validation(format!(
                "latency max {}ms below min {}ms",
                max.0, min.0
            ))),
            Self::CorruptBody { rate, .. } if !(0.0..=1.0).contains(rate) => Err(
                Error::validation(format!("corruption rate {rate} outside [0,1]")),
            ),
            Self::SlowBody { bytes_per_second: 0, .. }
            | Self::Bandwidth { bytes_per_second: 0, .. } => {
                Err(Error::validation("byte rate must be positive"))
            }
            _ => Ok(()),
        }
    }
}

/// Keyed-object form of a fault list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FaultMap {
    latency: Option<LatencyEntry>,
    error: Option<ErrorEntry>,
    timeout: Option<TimeoutEntry>,
    corrupt_body: Option<CorruptEntry>,
    empty_response: Option<ProbabilityEntry>,
    slow_body: Option<RateEntry>,
    connection_reset: Option<ProbabilityEntry>,
    partial_response: Option<PartialEntry>,
    bandwidth: Option<RateEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatencyEntry {
    min: DurationMs,
    max: DurationMs,
    #[serde(default = "default_probability")]
    probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEntry {
    #[serde(default = "default_probability")]
    probability: f64,
    #[serde(default)]
    default_code: Option<u16>,
    #[serde(default)]
    status_codes: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeoutEntry {
    #[serde(default = "default_probability")]
    probability: f64,
    #[serde(default = "default_timeout")]
    duration: DurationMs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CorruptEntry {
    #[serde(default = "default_corrupt_rate")]
    rate: f64,
    #[serde(default = "default_probability")]
    probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProbabilityEntry {
    #[serde(default = "default_probability")]
    probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateEntry {
    bytes_per_second: u64,
    #[serde(default = "default_probability")]
    probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartialEntry {
    max_bytes: usize,
    #[serde(default = "default_probability")]
    probability: f64,
}

impl From<FaultMap> for Vec<Fault> {
    fn from(map: FaultMap) -> Self {
        let mut faults = Vec::new();
        if let Some(e) = map.latency {
            faults.push(Fault::Latency {
                min: e.min,
                max: e.max,
                probability: e.probability,
            });
        }
        if let Some(e) = map.error {
            faults.push(Fault::Error {
                probability: e.probability,
                default_code: e.default_code,
                status_codes: e.status_codes,
            });
        }
        if let Some(e) = map.timeout {
            faults.push(Fault::Timeout {
                probability: e.probability,
                duration: e.duration,
            });
        }
        if let Some(e) = map.corrupt_body {
            faults.push(Fault::CorruptBody {
                rate: e.rate,
                probability: e.probability,
            });
        }
        if let Some(e) = map.empty_response {
            faults.push(Fault::EmptyResponse {
                probability: e.probability,
            });
        }
        if let Some(e) = map.slow_body {
            faults.push(Fault::SlowBody {
                bytes_per_second: e.bytes_per_second,
                probability: e.probability,
            });
        }
        if let Some(e) = map.connection_reset {
            faults.push(Fault::ConnectionReset {
                probability: e.probability,
            });
        }
        if let Some(e) = map.partial_response {
            faults.push(Fault::PartialResponse {
                max_bytes: e.max_bytes,
                probability: e.probability,
            });
        }
        if let Some(e) = map.bandwidth {
            faults.push(Fault::Bandwidth {
                bytes_per_second: e.bytes_per_second,
                probability: e.probability,
            });
        }
        faults
    }
}

/// Ordered fault list accepting both wire shapes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FaultList(pub Vec<Fault>);

impl<'de> Deserialize<'de> for FaultList {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<Fault>),
            Keyed(FaultMap),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::List(faults) => Self(faults),
            Raw::Keyed(map) => Self(map.into()),
        })
    }
}

/// A per-path chaos rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosRule {
    /// Glob (`*` one segment) or regex matched against the request path
    pub path_pattern: String,
    /// Method filter; empty matches every method
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    /// Gate for the whole fault list
    #[serde(default = "default_probability")]
    pub probability: f64,
    #[serde(default)]
    pub faults: FaultList,
}

/// Top-level chaos configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Faults applied to every request
    #[serde(default)]
    pub global_rules: FaultList,
    /// Ordered per-path rules; the first match applies
    #[serde(default)]
    pub rules: Vec<ChaosRule>,
}

impl ChaosConfig {
    /// Validate probability bounds and fault parameters
    pub fn validate(&self) -> Result<()> {
        for fault in &self.global_rules.0 {
            fault.validate()?;
        }
        for rule in &self.rules {
            if !(0.0..=1.0).contains(&rule.probability) {
                return Err(Error::validation(format!(
                    "rule probability {} outside [0,1]",
                    rule.probability
                )));
            }
            for fault in &rule.faults.0 {
                fault.validate()?;
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
    fn keyed_global_rules_parse() {
        let config: ChaosConfig = serde_json::from_value(json!({
            "enabled": true,
            "globalRules": {
                "latency": {"min": "200ms", "max": "200ms", "probability": 1.0}
            }
        }))
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.global_rules.0.len(), 1);
        assert_eq!(
            config.global_rules.0[0],
            Fault::Latency {
                min: DurationMs(200),
                max: DurationMs(200),
                probability: 1.0
            }
        );
    }

    #[test]
    fn listed_faults_keep_order() {
        let config: ChaosConfig = serde_json::from_value(json!({
            "enabled": true,
            "rules": [{
                "pathPattern": "/api/*",
                "methods": ["GET"],
                "probability": 0.5,
                "faults": [
                    {"type": "error", "statusCodes": [500, 503]},
                    {"type": "partialResponse", "maxBytes": 64}
                ]
            }]
        }))
        .unwrap();
        let rule = &config.rules[0];
        assert_eq!(rule.faults.0[0].kind_name(), "error");
        assert_eq!(rule.faults.0[1].kind_name(), "partial_response");
    }

    #[test]
    fn duration_strings_parse() {
        assert_eq!(parse_duration_ms("200ms"), Some(200));
        assert_eq!(parse_duration_ms("2s"), Some(2000));
        assert_eq!(parse_duration_ms("1.5s"), Some(1500));
        assert_eq!(parse_duration_ms("250"), Some(250));
        assert_eq!(parse_duration_ms("abc"), None);
    }

    #[test]
    fn probability_bounds_enforced() {
        let config = ChaosConfig {
            enabled: true,
            global_rules: FaultList(vec![Fault::EmptyResponse { probability: 1.5 }]),
            rules: vec![],
        };
        assert!(config.validate().is_err());

        let config = ChaosConfig {
            enabled: true,
            global_rules: FaultList(vec![Fault::Latency {
                min: DurationMs(100),
                max: DurationMs(50),
                probability: 1.0,
            }]),
            rules: vec![],
        };
        assert!(config.validate().is_err());
    }
}
