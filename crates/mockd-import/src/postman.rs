//! Postman collection (v2.x) import

use mockd_core::collection::MockCollection;
use mockd_core::model::{HttpMatcher, HttpMock, HttpResponseSpec, Mock, MockSpec};
use mockd_core::{Error, Result};
use serde_json::Value;

/// Convert a Postman collection into a mock collection
///
/// Folders are walked recursively; each request becomes one HTTP mock, with
/// the first saved response (when present) supplying status and body.
pub fn import(value: &Value) -> Result<MockCollection> {
    let name = value
        .pointer("/info/name")
        .and_then(Value::as_str)
        .unwrap_or("postman-import");
    let mut collection = MockCollection::new(name);

    let items = value
        .get("item")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::validation("postman collection has no 'item' array"))?;
    for item in items {
        walk_item(item, &mut collection);
    }
    Ok(collection)
}

fn walk_item(item: &Value, collection: &mut MockCollection) {
    if let Some(children) = item.get("item").and_then(Value::as_array) {
        for child in children {
            walk_item(child, collection);
        }
        return;
    }
    let Some(request) = item.get("request") else {
        return;
    };
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_uppercase();
    let Some(path) = request_path(request) else {
        return;
    };

    let (status, body) = item
        .get("response")
        .and_then(Value::as_array)
        .and_then(|responses| responses.first())
        .map(|response| {
            (
                response.get("code").and_then(Value::as_u64).unwrap_or(200) as u16,
                response
                    .get("body")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            )
        })
        .unwrap_or((200, String::new()));

    let mut mock = Mock::new(MockSpec::Http(HttpMock {
        matcher: HttpMatcher {
            method: Some(method),
            path,
            ..HttpMatcher::default()
        },
        response: HttpResponseSpec {
            status_code: status,
            body,
            ..HttpResponseSpec::default()
        },
        priority: 0,
    }));
    mock.name = item
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    collection.mocks.push(mock);
}

fn request_path(request: &Value) -> Option<String> {
    match request.get("url") {
        // `url` may be a bare string or a structured object with `path`.
        Some(Value::String(url)) => Some(crate::postman_path(url)),
        Some(url) => {
            let segments = url.get("path").and_then(Value::as_array)?;
            let joined: Vec<String> = segments
                .iter()
                .filter_map(Value::as_str)
                // Postman path variables are `:name` already.
                .map(ToString::to_string)
                .collect();
            Some(format!("/{}", joined.join("/")))
        }
        None => None,
    }
}
