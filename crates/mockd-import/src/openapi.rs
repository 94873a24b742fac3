//! OpenAPI 3.0 import

use mockd_core::collection::MockCollection;
use mockd_core::model::{HttpMatcher, HttpMock, HttpResponseSpec, Mock, MockSpec};
use mockd_core::{Error, Result};
use openapiv3::{OpenAPI, Operation, ReferenceOr, StatusCode};
use serde_json::Value;
use tracing::debug;

/// Convert an OpenAPI document (JSON form) into a mock collection
///
/// One HTTP mock per path+method; the response body comes from the first
/// 2xx response's JSON example when one exists.
pub fn import(value: &Value) -> Result<MockCollection> {
    let spec: OpenAPI = serde_json::from_value(value.clone())
        .map_err(|e| Error::validation(format!("not a parsable OpenAPI 3 document: {e}")))?;

    let name = spec.info.title.clone();
    let mut collection = MockCollection::new(&name);

    for (path, item) in &spec.paths.paths {
        let ReferenceOr::Item(item) = item else {
            debug!(%path, "skipping referenced path item");
            continue;
        };
        let operations: [(&str, Option<&Operation>); 7] = [
            ("GET", item.get.as_ref()),
            ("POST", item.post.as_ref()),
            ("PUT", item.put.as_ref()),
            ("DELETE", item.delete.as_ref()),
            ("PATCH", item.patch.as_ref()),
            ("HEAD", item.head.as_ref()),
            ("OPTIONS", item.options.as_ref()),
        ];
        for (method, operation) in operations {
            let Some(operation) = operation else { continue };
            let (status, body) = pick_response(operation);
            let mut mock = Mock::new(MockSpec::Http(HttpMock {
                matcher: HttpMatcher {
                    method: Some(method.to_string()),
                    path: convert_path(path),
                    ..HttpMatcher::default()
                },
                response: HttpResponseSpec {
                    status_code: status,
                    body,
                    ..HttpResponseSpec::default()
                },
                priority: 0,
            }));
            mock.name = operation
                .operation_id
                .clone()
                .unwrap_or_else(|| format!("{method} {path}"));
            collection.mocks.push(mock);
        }
    }
    Ok(collection)
}

/// `{param}` segments become `:param`
fn convert_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
                format!(":{}", &segment[1..segment.len() - 1])
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn pick_response(operation: &Operation) -> (u16, String) {
    let mut fallback = (200, String::new());
    for (status, response) in &operation.responses.responses {
        let StatusCode::Code(code) = status else { continue };
        let ReferenceOr::Item(response) = response else { continue };
        let body = response
            .content
            .get("application/json")
            .and_then(|media| media.example.as_ref())
            .map(ToString::to_string)
            .unwrap_or_default();
        if (200..300).contains(code) {
            return (*code, body);
        }
        fallback = (*code, body);
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn imports_paths_and_examples() {
        let spec = json!({
            "openapi": "3.0.0",
            "info": {"title": "Pets", "version": "1.0"},
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "responses": {
                            "200": {
                                "description": "ok",
                                "content": {
                                    "application/json": {
                                        "example": [{"id": 1, "name": "Rex"}]
                                    }
                                }
                            }
                        }
                    }
                },
                "/pets/{petId}": {
                    "delete": {
                        "responses": {"204": {"description": "gone"}}
                    }
                }
            }
        });
        let collection = import(&spec).unwrap();
        assert_eq!(collection.metadata.name, "Pets");
        assert_eq!(collection.mocks.len(), 2);

        let list = &collection.mocks[0];
        assert_eq!(list.name, "listPets");
        let MockSpec::Http(http) = &list.spec else { panic!() };
        assert_eq!(http.matcher.path, "/pets");
        assert_eq!(http.response.status_code, 200);
        assert!(http.response.body.contains("Rex"));

        let MockSpec::Http(delete) = &collection.mocks[1].spec else { panic!() };
        assert_eq!(delete.matcher.path, "/pets/:petId");
        assert_eq!(delete.response.status_code, 204);
    }

    #[test]
    fn path_template_conversion() {
        assert_eq!(convert_path("/users/{id}/posts/{postId}"), "/users/:id/posts/:postId");
        assert_eq!(convert_path("/plain"), "/plain");
    }
}
