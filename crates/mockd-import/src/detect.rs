//! Interchange format detection

use serde_json::Value;

/// The formats the portability layer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// The canonical mock-collection document
    Mockd,
    OpenApi,
    Postman,
    Har,
    WireMock,
    Curl,
}

impl Format {
    /// Parse a `format` query value
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mockd" => Some(Self::Mockd),
            "openapi" | "swagger" => Some(Self::OpenApi),
            "postman" => Some(Self::Postman),
            "har" => Some(Self::Har),
            "wiremock" => Some(Self::WireMock),
            "curl" => Some(Self::Curl),
            _ => None,
        }
    }

    /// Lowercase name as used in query params
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mockd => "mockd",
            Self::OpenApi => "openapi",
            Self::Postman => "postman",
            Self::Har => "har",
            Self::WireMock => "wiremock",
            Self::Curl => "curl",
        }
    }
}

/// Sniff the format of raw input
///
/// Tries JSON structure markers first, then YAML, then the cURL prefix.
pub fn detect(input: &str) -> Option<Format> {
    let trimmed = input.trim_start();
    if trimmed.starts_with("curl ") || trimmed.starts_with("curl\t") {
        return Some(Format::Curl);
    }
    let value: Value = serde_json::from_str(trimmed)
        .or_else(|_| serde_yaml::from_str(trimmed))
        .ok()?;
    detect_value(&value)
}

/// Sniff the format of an already-parsed document
pub fn detect_value(value: &Value) -> Option<Format> {
    let obj = value.as_object()?;
    if obj.get("kind").and_then(Value::as_str) == Some("MockCollection") {
        return Some(Format::Mockd);
    }
    if obj.contains_key("openapi") || obj.contains_key("swagger") {
        return Some(Format::OpenApi);
    }
    if obj
        .get("info")
        .and_then(Value::as_object)
        .is_some_and(|info| info.contains_key("_postman_id") || info.contains_key("schema"))
        && obj.contains_key("item")
    {
        return Some(Format::Postman);
    }
    if obj
        .get("log")
        .and_then(Value::as_object)
        .is_some_and(|log| log.contains_key("entries"))
    {
        return Some(Format::Har);
    }
    if obj.contains_key("mappings")
        || (obj.contains_key("request") && obj.contains_key("response"))
    {
        return Some(Format::WireMock);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_each_format() {
        assert_eq!(
            detect_value(&json!({"kind": "MockCollection", "version": "1.0"})),
            Some(Format::Mockd)
        );
        assert_eq!(
            detect_value(&json!({"openapi": "3.0.0", "paths": {}})),
            Some(Format::OpenApi)
        );
        assert_eq!(
            detect_value(&json!({"info": {"_postman_id": "x"}, "item": []})),
            Some(Format::Postman)
        );
        assert_eq!(
            detect_value(&json!({"log": {"entries": []}})),
            Some(Format::Har)
        );
        assert_eq!(
            detect_value(&json!({"mappings": []})),
            Some(Format::WireMock)
        );
        assert_eq!(detect("curl -X GET https://example.com"), Some(Format::Curl));
        assert_eq!(detect_value(&json!({"something": "else"})), None);
    }

    #[test]
    fn detects_yaml_openapi() {
        assert_eq!(detect("openapi: 3.0.0\npaths: {}\n"), Some(Format::OpenApi));
    }
}
