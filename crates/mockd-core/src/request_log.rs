//! Ring-buffered request log
//!
//! A bounded buffer with drop-oldest eviction. Writes take a short mutex and
//! never await, so the request path is never blocked on logging.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Maximum stored body snapshot, request or response side
pub const BODY_SNAPSHOT_CAP: usize = 8 * 1024;

/// One logged request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    /// Unique entry id
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    /// Header snapshot (names lowercased)
    pub headers: HashMap<String, String>,
    /// Bounded request body snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub status: u16,
    /// Matched mock id; empty string on a miss
    #[serde(default)]
    pub matched_mock: String,
    pub duration_ms: u64,
    /// Bounded response body snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
}

/// Filter for [`RequestLog::list`]
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub method: Option<String>,
    pub path: Option<String>,
    /// Matched mock id; empty string selects misses
    pub matched: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Bounded request log with FIFO eviction
pub struct RequestLog {
    entries: Mutex<VecDeque<RequestLogEntry>>,
    capacity: usize,
}

impl RequestLog {
    /// Create a log holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Record an entry, evicting the oldest when full
    pub fn push(&self, mut entry: RequestLogEntry) {
        truncate_snapshot(&mut entry.body);
        truncate_snapshot(&mut entry.response_body);
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// List entries, most recent first
    pub fn list(&self, query: &LogQuery) -> Vec<RequestLogEntry> {
        let entries = self.entries.lock();
        entries
            .iter()
            .rev()
            .filter(|e| query.method.as_ref().is_none_or(|m| e.method.eq_ignore_ascii_case(m)))
            .filter(|e| query.path.as_ref().is_none_or(|p| &e.path == p))
            .filter(|e| query.matched.as_ref().is_none_or(|m| &e.matched_mock == m))
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Look up one entry
    pub fn get(&self, id: &str) -> Option<RequestLogEntry> {
        self.entries.lock().iter().find(|e| e.id == id).cloned()
    }

    /// Total stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn truncate_snapshot(snapshot: &mut Option<String>) {
    if let Some(body) = snapshot {
        if body.len() > BODY_SNAPSHOT_CAP {
            let mut cut = BODY_SNAPSHOT_CAP;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
    }
}

/// Build an entry with a fresh id and current timestamp
pub fn new_entry(method: &str, path: &str) -> RequestLogEntry {
    RequestLogEntry {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        method: method.to_string(),
        path: path.to_string(),
        headers: HashMap::new(),
        body: None,
        status: 0,
        matched_mock: String::new(),
        duration_ms: 0,
        response_body: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(method: &str, path: &str, status: u16) -> RequestLogEntry {
        let mut e = new_entry(method, path);
        e.status = status;
        e
    }

    #[test]
    fn eviction_drops_oldest() {
        let log = RequestLog::new(2);
        log.push(entry("GET", "/a", 200));
        log.push(entry("GET", "/b", 200));
        log.push(entry("GET", "/c", 200));
        let entries = log.list(&LogQuery::default());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "/c");
        assert_eq!(entries[1].path, "/b");
    }

    #[test]
    fn filters_and_pagination() {
        let log = RequestLog::new(100);
        for i in 0..10 {
            log.push(entry(if i % 2 == 0 { "GET" } else { "POST" }, "/x", 200));
        }
        let gets = log.list(&LogQuery {
            method: Some("get".into()),
            ..LogQuery::default()
        });
        assert_eq!(gets.len(), 5);

        let page = log.list(&LogQuery {
            limit: Some(3),
            offset: 2,
            ..LogQuery::default()
        });
        assert_eq!(page.len(), 3);
    }

    #[test]
    fn matched_filter_selects_misses_via_empty_string() {
        let log = RequestLog::new(10);
        let mut hit = entry("GET", "/hit", 200);
        hit.matched_mock = "mk_1".into();
        log.push(hit);
        log.push(entry("GET", "/miss", 404));

        let misses = log.list(&LogQuery {
            matched: Some(String::new()),
            ..LogQuery::default()
        });
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].path, "/miss");
    }

    #[test]
    fn body_snapshots_are_bounded() {
        let log = RequestLog::new(10);
        let mut e = entry("POST", "/big", 200);
        e.body = Some("x".repeat(BODY_SNAPSHOT_CAP * 2));
        log.push(e);
        let stored = &log.list(&LogQuery::default())[0];
        assert_eq!(stored.body.as_ref().unwrap().len(), BODY_SNAPSHOT_CAP);
    }

    #[test]
    fn get_and_clear() {
        let log = RequestLog::new(10);
        let e = entry("GET", "/a", 200);
        let id = e.id.clone();
        log.push(e);
        assert!(log.get(&id).is_some());
        log.clear();
        assert!(log.is_empty());
        assert!(log.get(&id).is_none());
    }
}
