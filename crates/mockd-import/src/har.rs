//! HAR (HTTP Archive) import

use mockd_core::collection::MockCollection;
use mockd_core::model::{HttpMatcher, HttpMock, HttpResponseSpec, Mock, MockSpec};
use mockd_core::{Error, Result};
use serde_json::Value;

/// Convert a HAR capture into a mock collection (one mock per entry)
pub fn import(value: &Value) -> Result<MockCollection> {
    let entries = value
        .pointer("/log/entries")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::validation("HAR document has no log.entries"))?;

    let mut collection = MockCollection::new("har-import");
    for entry in entries {
        let Some(request) = entry.get("request") else { continue };
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let Some(url) = request.get("url").and_then(Value::as_str) else {
            continue;
        };
        let path = crate::postman_path(url);

        let status = entry
            .pointer("/response/status")
            .and_then(Value::as_u64)
            .unwrap_or(200) as u16;
        let body = entry
            .pointer("/response/content/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let content_type = entry
            .pointer("/response/content/mimeType")
            .and_then(Value::as_str);

        let mut response = HttpResponseSpec {
            status_code: status,
            body,
            ..HttpResponseSpec::default()
        };
        if let Some(content_type) = content_type {
            response
                .headers
                .insert("Content-Type".to_string(), content_type.to_string());
        }

        collection.mocks.push(Mock::new(MockSpec::Http(HttpMock {
            matcher: HttpMatcher {
                method: Some(method),
                path,
                ..HttpMatcher::default()
            },
            response,
            priority: 0,
        })));
    }
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn imports_entries_with_status_and_body() {
        let har = json!({
            "log": {
                "entries": [
                    {
                        "request": {"method": "GET", "url": "https://api.test/items?page=1"},
                        "response": {
                            "status": 200,
                            "content": {"text": "[1,2]", "mimeType": "application/json"}
                        }
                    },
                    {
                        "request": {"method": "POST", "url": "https://api.test/items"},
                        "response": {"status": 201, "content": {}}
                    }
                ]
            }
        });
        let collection = import(&har).unwrap();
        assert_eq!(collection.mocks.len(), 2);

        let MockSpec::Http(first) = &collection.mocks[0].spec else { panic!() };
        assert_eq!(first.matcher.path, "/items");
        assert_eq!(first.response.body, "[1,2]");
        assert_eq!(
            first.response.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );

        let MockSpec::Http(second) = &collection.mocks[1].spec else { panic!() };
        assert_eq!(second.response.status_code, 201);
    }
}
