//! # mockd import
//!
//! The portability layer: detection of interchange formats and conversion
//! to and from the canonical mock collection. Imports accept OpenAPI,
//! Postman, HAR, WireMock, and the canonical document itself; exports
//! produce canonical JSON/YAML and a cURL script.

pub mod curl;
pub mod detect;
pub mod har;
pub mod openapi;
pub mod postman;
pub mod wiremock;

pub use detect::{detect, detect_value, Format};

use mockd_core::collection::MockCollection;
use mockd_core::{Error, Result};
use serde_json::Value;

/// Convert a parsed document of any supported import format
pub fn import_value(value: &Value) -> Result<MockCollection> {
    let format = detect_value(value)
        .ok_or_else(|| Error::validation("unrecognized configuration format"))?;
    import_as(value, format)
}

/// Convert a parsed document as a specific format
pub fn import_as(value: &Value, format: Format) -> Result<MockCollection> {
    match format {
        Format::Mockd => {
            let collection: MockCollection = serde_json::from_value(value.clone())?;
            collection.validate()?;
            Ok(collection)
        }
        Format::OpenApi => openapi::import(value),
        Format::Postman => postman::import(value),
        Format::Har => har::import(value),
        Format::WireMock => wiremock::import(value),
        Format::Curl => Err(Error::validation("cURL is an export-only format")),
    }
}

/// Export a collection in the requested format
///
/// Returns the rendered document and its content type.
pub fn export(collection: &MockCollection, format: Format) -> Result<(String, &'static str)> {
    match format {
        Format::Mockd => Ok((collection.to_json()?, "application/json")),
        Format::Curl => Ok((curl::export(collection, "http://localhost:8080"), "text/plain")),
        other => Err(Error::validation(format!(
            "export to '{}' is not supported",
            other.as_str()
        ))),
    }
}

/// Strip scheme/host/query from a URL, leaving the path
pub(crate) fn postman_path(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    match without_scheme.find('/') {
        Some(idx) => without_scheme[idx..]
            .split('?')
            .next()
            .unwrap_or("/")
            .to_string(),
        None => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockd_core::model::{HttpMatcher, HttpMock, HttpResponseSpec, Mock, MockSpec};
    use serde_json::json;

    #[test]
    fn canonical_round_trip_preserves_semantics() {
        let mut collection = MockCollection::new("round-trip");
        let mut mock = Mock::new(MockSpec::Http(HttpMock {
            matcher: HttpMatcher {
                method: Some("GET".into()),
                path: "/api/users".into(),
                ..HttpMatcher::default()
            },
            response: HttpResponseSpec {
                body: "[]".into(),
                ..HttpResponseSpec::default()
            },
            priority: 3,
        }));
        mock.id = "mk_keep".into();
        collection.mocks.push(mock);

        let (exported, content_type) = export(&collection, Format::Mockd).unwrap();
        assert_eq!(content_type, "application/json");
        let reimported =
            import_value(&serde_json::from_str(&exported).unwrap()).unwrap();
        assert_eq!(reimported, collection);
    }

    #[test]
    fn import_dispatches_on_detection() {
        let openapi = json!({
            "openapi": "3.0.0",
            "info": {"title": "T", "version": "1"},
            "paths": {"/x": {"get": {"responses": {"200": {"description": "ok"}}}}}
        });
        let collection = import_value(&openapi).unwrap();
        assert_eq!(collection.mocks.len(), 1);

        let unknown = json!({"mystery": true});
        assert!(import_value(&unknown).is_err());
    }

    #[test]
    fn url_path_helper() {
        assert_eq!(postman_path("https://api.test/users?x=1"), "/users");
        assert_eq!(postman_path("api.test"), "/");
    }
}
