//! HTTP matcher engine
//!
//! Selects the highest-precedence enabled HTTP mock for a request. The index
//! lives inside a registry snapshot, so it is immutable once built: a
//! precedence-sorted entry list for iteration plus a literal-prefix trie that
//! prunes candidates before the full predicate runs.
//!
//! Precedence: priority DESC, specificity DESC, path length DESC, insertion
//! order ASC. Specificity is literal segments minus wildcard segments.

use crate::model::{BodyMatcher, HttpMock, Mock, MockSpec};
use crate::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One segment of a compiled path pattern
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Must equal this literal
    Literal(String),
    /// `:name`, matches one segment and captures it
    Param(String),
    /// `*`, matches exactly one segment
    Wildcard,
    /// `**`, matches zero or more segments
    Glob,
}

/// A compiled path pattern
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a pattern string
    pub fn parse(raw: &str) -> Result<Self> {
        if !raw.starts_with('/') {
            return Err(Error::validation(format!(
                "path pattern '{raw}' must start with '/'"
            )));
        }
        let segments = split_path(raw)
            .map(|s| match s {
                "*" => Segment::Wildcard,
                "**" => Segment::Glob,
                s if s.starts_with(':') && s.len() > 1 => Segment::Param(s[1..].to_string()),
                s => Segment::Literal(s.to_string()),
            })
            .collect();
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Original pattern text
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Compiled segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Literal segments minus wildcard-ish segments
    pub fn specificity(&self) -> i32 {
        let mut score = 0i32;
        for seg in &self.segments {
            match seg {
                Segment::Literal(_) => score += 1,
                _ => score -= 1,
            }
        }
        score
    }

    /// Leading literal segments, used as the trie key
    pub fn literal_prefix(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map_while(|s| match s {
            Segment::Literal(l) => Some(l.as_str()),
            _ => None,
        })
    }

    /// Match a concrete path, capturing `:name` params
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = split_path(path).collect();
        let mut params = HashMap::new();
        if match_segments(&self.segments, &parts, &mut params) {
            Some(params)
        } else {
            None
        }
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn match_segments(
    pattern: &[Segment],
    path: &[&str],
    params: &mut HashMap<String, String>,
) -> bool {
    match (pattern.first(), path.first()) {
        (None, None) => true,
        (Some(Segment::Glob), _) => {
            // `**` consumes zero or more segments; try shortest first
            if match_segments(&pattern[1..], path, params) {
                return true;
            }
            !path.is_empty() && match_segments(pattern, &path[1..], params)
        }
        (Some(seg), Some(part)) => {
            let ok = match seg {
                Segment::Literal(l) => l == part,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                    true
                }
                Segment::Wildcard => true,
                Segment::Glob => unreachable!("handled above"),
            };
            ok && match_segments(&pattern[1..], &path[1..], params)
        }
        _ => false,
    }
}

/// Compiled predicate half of an HTTP mock
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    method: Option<String>,
    pattern: PathPattern,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<CompiledBody>,
}

#[derive(Debug, Clone)]
enum CompiledBody {
    Exact(String),
    Contains(String),
    JsonEquals { value: Value, pointer: Option<String> },
    Regex(Regex),
}

impl CompiledMatcher {
    /// Compile the matcher half of an HTTP mock
    pub fn compile(http: &HttpMock) -> Result<Self> {
        let body = match &http.matcher.body {
            None => None,
            Some(BodyMatcher::Exact { value }) => Some(CompiledBody::Exact(value.clone())),
            Some(BodyMatcher::Contains { value }) => Some(CompiledBody::Contains(value.clone())),
            Some(BodyMatcher::JsonEquals { value, pointer }) => Some(CompiledBody::JsonEquals {
                value: value.clone(),
                pointer: pointer.clone(),
            }),
            Some(BodyMatcher::Regex { pattern }) => Some(CompiledBody::Regex(Regex::new(pattern)?)),
        };
        Ok(Self {
            method: http.matcher.method.as_ref().map(|m| m.to_uppercase()),
            pattern: PathPattern::parse(&http.matcher.path)?,
            headers: http
                .matcher
                .headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            query: http
                .matcher
                .query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            body,
        })
    }

    /// The compiled path pattern
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Evaluate against a request, returning captured path params on match
    pub fn matches(&self, req: &RequestFacts<'_>) -> Option<HashMap<String, String>> {
        if let Some(method) = &self.method {
            if method != req.method {
                return None;
            }
        }
        let params = self.pattern.matches(req.path)?;
        for (name, expected) in &self.headers {
            if req.headers.get(name).map(String::as_str) != Some(expected.as_str()) {
                return None;
            }
        }
        for (name, expected) in &self.query {
            if req.query.get(name).map(String::as_str) != Some(expected.as_str()) {
                return None;
            }
        }
        if let Some(body) = &self.body {
            let text = req.body.unwrap_or("");
            let ok = match body {
                CompiledBody::Exact(v) => text == v,
                CompiledBody::Contains(v) => text.contains(v.as_str()),
                CompiledBody::Regex(re) => re.is_match(text),
                CompiledBody::JsonEquals { value, pointer } => {
                    match serde_json::from_str::<Value>(text) {
                        Ok(parsed) => {
                            let target = match pointer {
                                Some(p) => parsed.pointer(p),
                                None => Some(&parsed),
                            };
                            target == Some(value)
                        }
                        Err(_) => false,
                    }
                }
            };
            if !ok {
                return None;
            }
        }
        Some(params)
    }
}

/// The facts about a request the matcher consumes
///
/// Header names must already be lowercased; query values URL-decoded.
#[derive(Debug)]
pub struct RequestFacts<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub headers: &'a HashMap<String, String>,
    pub query: &'a HashMap<String, String>,
    pub body: Option<&'a str>,
}

/// Outcome of a successful match
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub mock: Arc<Mock>,
    /// Captured `:name` path params
    pub params: HashMap<String, String>,
}

struct IndexEntry {
    mock: Arc<Mock>,
    compiled: CompiledMatcher,
}

#[derive(Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    /// Entry indices whose literal prefix ends here
    bucket: Vec<usize>,
}

impl TrieNode {
    fn insert(&mut self, prefix: &[&str], idx: usize) {
        match prefix.first() {
            None => self.bucket.push(idx),
            Some(head) => self
                .children
                .entry((*head).to_string())
                .or_default()
                .insert(&prefix[1..], idx),
        }
    }

    /// Collect buckets along the path; a pattern's non-literal tail can match
    /// anything, so every prefix node on the way contributes
    fn collect<'a>(&'a self, parts: &[&str], out: &mut Vec<usize>) {
        out.extend_from_slice(&self.bucket);
        if let Some(head) = parts.first() {
            if let Some(child) = self.children.get(*head) {
                child.collect(&parts[1..], out);
            }
        }
    }
}

/// Immutable matcher index over the enabled HTTP mocks of one snapshot
pub struct MatcherIndex {
    entries: Vec<IndexEntry>,
    trie: TrieNode,
}

impl MatcherIndex {
    /// Build the index from registry contents (insertion order preserved)
    pub fn build(mocks: &[Arc<Mock>]) -> Self {
        let mut keyed: Vec<(i64, i32, usize, usize, IndexEntry)> = Vec::new();
        for (order, mock) in mocks.iter().enumerate() {
            if !mock.is_enabled() {
                continue;
            }
            let MockSpec::Http(http) = &mock.spec else {
                continue;
            };
            // Validation happens on registry writes; a matcher that still
            // fails to compile here is skipped rather than poisoning lookups.
            let compiled = match CompiledMatcher::compile(http) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(mock_id = %mock.id, error = %e, "skipping uncompilable matcher");
                    continue;
                }
            };
            keyed.push((
                i64::from(http.priority),
                compiled.pattern().specificity(),
                http.matcher.path.len(),
                order,
                IndexEntry {
                    mock: Arc::clone(mock),
                    compiled,
                },
            ));
        }
        keyed.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(b.1.cmp(&a.1))
                .then(b.2.cmp(&a.2))
                .then(a.3.cmp(&b.3))
        });

        let entries: Vec<IndexEntry> = keyed.into_iter().map(|(_, _, _, _, e)| e).collect();
        let mut trie = TrieNode::default();
        for (idx, entry) in entries.iter().enumerate() {
            let prefix: Vec<&str> = entry.compiled.pattern().literal_prefix().collect();
            trie.insert(&prefix, idx);
        }
        Self { entries, trie }
    }

    /// Number of indexed matchers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no HTTP mock is indexed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Select the highest-precedence mock matching the request
    pub fn select(&self, req: &RequestFacts<'_>) -> Option<MatchResult> {
        let parts: Vec<&str> = split_path(req.path).collect();
        let mut candidates = Vec::new();
        self.trie.collect(&parts, &mut candidates);
        // Entry indices are precedence positions; the smallest matching
        // index is the winner.
        candidates.sort_unstable();
        for idx in candidates {
            let entry = &self.entries[idx];
            if let Some(params) = entry.compiled.matches(req) {
                return Some(MatchResult {
                    mock: Arc::clone(&entry.mock),
                    params,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpMatcher, HttpResponseSpec, MockKind};

    fn http_mock(id: &str, method: Option<&str>, path: &str, priority: i32) -> Arc<Mock> {
        Arc::new(Mock {
            id: id.to_string(),
            name: String::new(),
            description: None,
            enabled: None,
            spec: MockSpec::Http(HttpMock {
                matcher: HttpMatcher {
                    method: method.map(String::from),
                    path: path.to_string(),
                    ..HttpMatcher::default()
                },
                response: HttpResponseSpec::default(),
                priority,
            }),
        })
    }

    fn facts<'a>(
        method: &'a str,
        path: &'a str,
        headers: &'a HashMap<String, String>,
        query: &'a HashMap<String, String>,
    ) -> RequestFacts<'a> {
        RequestFacts {
            method,
            path,
            headers,
            query,
            body: None,
        }
    }

    #[test]
    fn pattern_literals_and_wildcards() {
        let p = PathPattern::parse("/api/*/items/**").unwrap();
        assert!(p.matches("/api/v1/items").is_some());
        assert!(p.matches("/api/v1/items/a/b/c").is_some());
        assert!(p.matches("/api/items").is_none());

        let p = PathPattern::parse("/users/:id").unwrap();
        let params = p.matches("/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn glob_matches_zero_segments() {
        let p = PathPattern::parse("/files/**").unwrap();
        assert!(p.matches("/files").is_some());
        assert!(p.matches("/files/a").is_some());
    }

    #[test]
    fn priority_wins_over_insertion_order() {
        let mocks = vec![
            http_mock("low", Some("GET"), "/api/users", 1),
            http_mock("high", Some("GET"), "/api/users", 10),
        ];
        let index = MatcherIndex::build(&mocks);
        let headers = HashMap::new();
        let query = HashMap::new();
        let result = index.select(&facts("GET", "/api/users", &headers, &query)).unwrap();
        assert_eq!(result.mock.id, "high");
    }

    #[test]
    fn specificity_beats_wildcards_at_equal_priority() {
        let mocks = vec![
            http_mock("wild", Some("GET"), "/api/*", 0),
            http_mock("literal", Some("GET"), "/api/users", 0),
        ];
        let index = MatcherIndex::build(&mocks);
        let headers = HashMap::new();
        let query = HashMap::new();
        let result = index.select(&facts("GET", "/api/users", &headers, &query)).unwrap();
        assert_eq!(result.mock.id, "literal");
    }

    #[test]
    fn insertion_order_breaks_full_ties() {
        let mocks = vec![
            http_mock("first", Some("GET"), "/api/users", 0),
            http_mock("second", Some("GET"), "/api/users", 0),
        ];
        let index = MatcherIndex::build(&mocks);
        let headers = HashMap::new();
        let query = HashMap::new();
        let result = index.select(&facts("GET", "/api/users", &headers, &query)).unwrap();
        assert_eq!(result.mock.id, "first");
    }

    #[test]
    fn disabled_mocks_are_not_indexed() {
        let mut mock = (*http_mock("off", Some("GET"), "/api/users", 0)).clone();
        mock.enabled = Some(false);
        let index = MatcherIndex::build(&[Arc::new(mock)]);
        let headers = HashMap::new();
        let query = HashMap::new();
        assert!(index.select(&facts("GET", "/api/users", &headers, &query)).is_none());
    }

    #[test]
    fn header_and_query_equality() {
        let mut mock = (*http_mock("hq", Some("GET"), "/api/users", 0)).clone();
        if let MockSpec::Http(http) = &mut mock.spec {
            http.matcher.headers.insert("X-Tenant".into(), "acme".into());
            http.matcher.query.insert("page".into(), "2".into());
        }
        let index = MatcherIndex::build(&[Arc::new(mock)]);

        let mut headers = HashMap::new();
        headers.insert("x-tenant".to_string(), "acme".to_string());
        let mut query = HashMap::new();
        query.insert("page".to_string(), "2".to_string());
        assert!(index.select(&facts("GET", "/api/users", &headers, &query)).is_some());

        let empty_q = HashMap::new();
        assert!(index.select(&facts("GET", "/api/users", &headers, &empty_q)).is_none());
    }

    #[test]
    fn body_matcher_json_equals_with_pointer() {
        let mut mock = (*http_mock("jb", Some("POST"), "/api/orders", 0)).clone();
        if let MockSpec::Http(http) = &mut mock.spec {
            http.matcher.body = Some(BodyMatcher::JsonEquals {
                value: serde_json::json!("widget"),
                pointer: Some("/item/name".into()),
            });
        }
        let index = MatcherIndex::build(&[Arc::new(mock)]);
        let headers = HashMap::new();
        let query = HashMap::new();
        let body = r#"{"item":{"name":"widget"},"qty":3}"#;
        let req = RequestFacts {
            method: "POST",
            path: "/api/orders",
            headers: &headers,
            query: &query,
            body: Some(body),
        };
        assert!(index.select(&req).is_some());
    }

    #[test]
    fn empty_matcher_matches_everything_under_pattern() {
        let mocks = vec![http_mock("all", None, "/**", 0)];
        let index = MatcherIndex::build(&mocks);
        let headers = HashMap::new();
        let query = HashMap::new();
        assert!(index.select(&facts("DELETE", "/anything/at/all", &headers, &query)).is_some());
        assert_eq!(index.len(), 1);
        assert!(!index.is_empty());
        let _ = MockKind::Http;
    }
}
