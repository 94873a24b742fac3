//! WireMock mapping import

use mockd_core::collection::MockCollection;
use mockd_core::model::{BodyMatcher, HttpMatcher, HttpMock, HttpResponseSpec, Mock, MockSpec};
use mockd_core::{Error, Result};
use serde_json::Value;

/// Convert WireMock mappings (a `mappings` array or a single mapping)
pub fn import(value: &Value) -> Result<MockCollection> {
    let mappings: Vec<&Value> = match value.get("mappings").and_then(Value::as_array) {
        Some(mappings) => mappings.iter().collect(),
        None if value.get("request").is_some() => vec![value],
        None => return Err(Error::validation("not a WireMock mapping document")),
    };

    let mut collection = MockCollection::new("wiremock-import");
    for mapping in mappings {
        let Some(request) = mapping.get("request") else { continue };
        let Some(response) = mapping.get("response") else { continue };

        let method = request
            .get("method")
            .and_then(Value::as_str)
            .filter(|m| *m != "ANY")
            .map(str::to_uppercase);
        let Some(path) = request_path(request) else { continue };

        let body_matcher = request
            .get("bodyPatterns")
            .and_then(Value::as_array)
            .and_then(|patterns| patterns.first())
            .and_then(body_pattern);

        let mut headers = std::collections::HashMap::new();
        if let Some(response_headers) = response.get("headers").and_then(Value::as_object) {
            for (name, header_value) in response_headers {
                if let Some(text) = header_value.as_str() {
                    headers.insert(name.clone(), text.to_string());
                }
            }
        }

        let body = response
            .get("body")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .or_else(|| response.get("jsonBody").map(ToString::to_string))
            .unwrap_or_default();

        collection.mocks.push(Mock::new(MockSpec::Http(HttpMock {
            matcher: HttpMatcher {
                method,
                path,
                body: body_matcher,
                ..HttpMatcher::default()
            },
            response: HttpResponseSpec {
                status_code: response.get("status").and_then(Value::as_u64).unwrap_or(200)
                    as u16,
                headers,
                body,
                ..HttpResponseSpec::default()
            },
            priority: mapping.get("priority").and_then(Value::as_i64).unwrap_or(0) as i32,
        })));
    }
    Ok(collection)
}

fn request_path(request: &Value) -> Option<String> {
    if let Some(path) = request.get("urlPath").and_then(Value::as_str) {
        return Some(path.to_string());
    }
    if let Some(url) = request.get("url").and_then(Value::as_str) {
        return Some(url.split('?').next().unwrap_or(url).to_string());
    }
    // Pattern forms match loosely; a trailing glob keeps their spirit.
    if let Some(pattern) = request
        .get("urlPathPattern")
        .or_else(|| request.get("urlPattern"))
        .and_then(Value::as_str)
    {
        let literal: String = pattern
            .split(['[', '(', '.', '\\'])
            .next()
            .unwrap_or(pattern)
            .to_string();
        let trimmed = literal.trim_end_matches('/');
        return Some(format!("{trimmed}/**"));
    }
    None
}

fn body_pattern(pattern: &Value) -> Option<BodyMatcher> {
    if let Some(text) = pattern.get("equalTo").and_then(Value::as_str) {
        return Some(BodyMatcher::Exact {
            value: text.to_string(),
        });
    }
    if let Some(json) = pattern.get("equalToJson") {
        let value = match json {
            Value::String(text) => serde_json::from_str(text).ok()?,
            other => other.clone(),
        };
        return Some(BodyMatcher::JsonEquals {
            value,
            pointer: None,
        });
    }
    if let Some(text) = pattern.get("contains").and_then(Value::as_str) {
        return Some(BodyMatcher::Contains {
            value: text.to_string(),
        });
    }
    if let Some(regex) = pattern.get("matches").and_then(Value::as_str) {
        return Some(BodyMatcher::Regex {
            pattern: regex.to_string(),
        });
    }
    None
}
