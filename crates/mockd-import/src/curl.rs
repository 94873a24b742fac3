//! cURL script export

use mockd_core::collection::MockCollection;
use mockd_core::model::MockSpec;

/// Render the collection's HTTP mocks as a runnable cURL script
///
/// Non-HTTP mocks have no cURL equivalent and are skipped.
pub fn export(collection: &MockCollection, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let mut out = String::from("#!/bin/sh\n");
    if !collection.metadata.name.is_empty() {
        out.push_str(&format!("# {}\n", collection.metadata.name));
    }
    for mock in &collection.mocks {
        let MockSpec::Http(http) = &mock.spec else {
            continue;
        };
        out.push('\n');
        if !mock.name.is_empty() {
            out.push_str(&format!("# {}\n", mock.name));
        }
        let method = http.matcher.method.as_deref().unwrap_or("GET");
        out.push_str(&format!("curl -X {method}"));
        for (name, value) in &http.matcher.headers {
            out.push_str(&format!(" \\\n  -H {}", shell_quote(&format!("{name}: {value}"))));
        }
        let mut url = format!("{base}{}", http.matcher.path);
        if !http.matcher.query.is_empty() {
            let query: Vec<String> = http
                .matcher
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }
        out.push_str(&format!(" \\\n  {}\n", shell_quote(&url)));
    }
    out
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
