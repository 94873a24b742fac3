//! Stateful resource engine
//!
//! Each registered resource is an insertion-ordered collection of JSON
//! objects with seed data, server-managed timestamps, and optional nesting
//! under a parent resource. Operations are short and guarded by a
//! per-resource mutex; there are no cross-resource transactions.

use crate::model::{IdMode, ResourceSpec};
use crate::{Error, Result};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const RESERVED_KEYS: &[&str] = &["sort", "order", "limit", "offset"];

/// Default page size for list operations
pub const DEFAULT_LIMIT: usize = 20;
/// Hard cap on page size
pub const MAX_LIMIT: usize = 1000;

/// Parameters of a list operation
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Equality filters over item fields
    pub filters: HashMap<String, String>,
    pub sort: Option<String>,
    /// `asc` (default) or `desc`
    pub descending: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ListParams {
    /// Build from a raw query-parameter map, splitting reserved keys out
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let mut params = Self {
            sort: query.get("sort").cloned(),
            descending: query.get("order").map(String::as_str) == Some("desc"),
            limit: query.get("limit").and_then(|v| v.parse().ok()),
            offset: query.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0),
            ..Self::default()
        };
        for (key, value) in query {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                params.filters.insert(key.clone(), value.clone());
            }
        }
        params
    }
}

/// Page of results plus pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct ResourcePage {
    pub data: Vec<Value>,
    pub meta: PageMeta,
}

/// Pagination metadata for a list response
#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    /// Matching items before pagination
    pub total: usize,
    /// Items in this page
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Per-resource counts for the admin overview
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOverview {
    pub name: String,
    pub base_path: String,
    pub count: usize,
    pub seed_count: usize,
}

/// Where a request path landed within a resource
#[derive(Debug, Clone)]
pub struct ResourceRoute {
    pub resource: String,
    /// Trailing item id segment, when present
    pub id: Option<String>,
    /// Parent id captured from the `:param` segment
    pub parent: Option<String>,
}

struct ResourceState {
    spec: ResourceSpec,
    /// Seed with ids normalized at registration; reset restores exactly this
    seed: Vec<Value>,
    items: Mutex<IndexMap<String, Value>>,
    next_seq: AtomicU64,
}

impl ResourceState {
    fn item_id(&self, item: &Value) -> Option<String> {
        item.get(&self.spec.id_field).map(value_as_string)
    }

    fn assign_id(&self) -> String {
        match self.spec.id_mode {
            IdMode::Uuid => uuid::Uuid::new_v4().to_string(),
            IdMode::Sequential => {
                let n = self.next_seq.fetch_add(1, Ordering::Relaxed);
                format!("{}-{}", self.spec.name, n)
            }
        }
    }
}

/// Registry of stateful resources
#[derive(Default)]
pub struct ResourceStore {
    resources: RwLock<IndexMap<String, Arc<ResourceState>>>,
}

impl ResourceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource and load its seed data
    ///
    /// Re-registering an existing name replaces the declaration and resets
    /// live state to the new seed.
    pub fn register(&self, spec: ResourceSpec) -> Result<()> {
        spec.validate()?;
        let scratch = ResourceState {
            seed: Vec::new(),
            items: Mutex::new(IndexMap::new()),
            next_seq: AtomicU64::new(1),
            spec,
        };
        // Normalize seed ids once so reset is idempotent.
        let mut seed = Vec::new();
        let mut items = IndexMap::new();
        for mut item in scratch.spec.seed.clone() {
            let id = match scratch.item_id(&item) {
                Some(id) => id,
                None => {
                    let id = scratch.assign_id();
                    set_field(&mut item, &scratch.spec.id_field, json!(id.clone()));
                    id
                }
            };
            seed.push(item.clone());
            items.insert(id, item);
        }
        let state = Arc::new(ResourceState {
            spec: scratch.spec,
            seed,
            items: Mutex::new(items),
            next_seq: scratch.next_seq,
        });
        self.resources.write().insert(state.spec.name.clone(), state);
        Ok(())
    }

    /// Remove a resource entirely
    pub fn unregister(&self, name: &str) -> Result<()> {
        self.resources
            .write()
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("resource '{name}'")))
    }

    /// Registered resource names in registration order
    pub fn names(&self) -> Vec<String> {
        self.resources.read().keys().cloned().collect()
    }

    /// Registered declarations, for configuration export
    pub fn specs(&self) -> Vec<ResourceSpec> {
        self.resources
            .read()
            .values()
            .map(|state| state.spec.clone())
            .collect()
    }

    /// Match a request path against registered base paths
    ///
    /// Returns the owning resource, the trailing item id (when the path has
    /// one extra segment), and the parent id captured from `:param`.
    pub fn route(&self, path: &str) -> Option<ResourceRoute> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let resources = self.resources.read();
        for state in resources.values() {
            let base: Vec<&str> = state
                .spec
                .base_path
                .split('/')
                .filter(|s| !s.is_empty())
                .collect();
            if parts.len() != base.len() && parts.len() != base.len() + 1 {
                continue;
            }
            let mut captured: HashMap<&str, &str> = HashMap::new();
            let base_matches = base.iter().zip(parts.iter()).all(|(pattern, part)| {
                if let Some(name) = pattern.strip_prefix(':') {
                    captured.insert(name, part);
                    true
                } else {
                    pattern == part
                }
            });
            if !base_matches {
                continue;
            }
            let parent = state.spec.parent_field.as_ref().and_then(|field| {
                captured
                    .get(field.as_str())
                    .or_else(|| captured.values().next().map(|v| &*v))
                    .map(|v| (*v).to_string())
            });
            return Some(ResourceRoute {
                resource: state.spec.name.clone(),
                id: (parts.len() == base.len() + 1).then(|| parts[base.len()].to_string()),
                parent,
            });
        }
        None
    }

    /// List items with filtering, sorting, and pagination
    pub fn list(
        &self,
        name: &str,
        params: &ListParams,
        parent: Option<&str>,
    ) -> Result<ResourcePage> {
        let state = self.state(name)?;
        let items = state.items.lock();
        let mut matched: Vec<Value> = items
            .values()
            .filter(|item| parent_matches(&state.spec, item, parent))
            .filter(|item| {
                params.filters.iter().all(|(field, expected)| {
                    item.get(field).map(value_as_string).as_deref() == Some(expected.as_str())
                })
            })
            .cloned()
            .collect();
        drop(items);

        if let Some(sort) = &params.sort {
            matched.sort_by(|a, b| compare_fields(a.get(sort), b.get(sort)));
            if params.descending {
                matched.reverse();
            }
        }

        let total = matched.len();
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let data: Vec<Value> = matched
            .into_iter()
            .skip(params.offset)
            .take(limit)
            .collect();
        Ok(ResourcePage {
            meta: PageMeta {
                total,
                count: data.len(),
                limit,
                offset: params.offset,
            },
            data,
        })
    }

    /// Fetch a single item
    pub fn get(&self, name: &str, id: &str, parent: Option<&str>) -> Result<Value> {
        let state = self.state(name)?;
        let items = state.items.lock();
        items
            .get(id)
            .filter(|item| parent_matches(&state.spec, item, parent))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("{name}/{id}")))
    }

    /// Create an item; the id is auto-assigned when absent
    pub fn create(&self, name: &str, body: Value, parent: Option<&str>) -> Result<Value> {
        let mut item = require_object(body)?;
        let state = self.state(name)?;

        let id = match state.item_id(&Value::Object(item.clone())) {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = state.assign_id();
                item.insert(state.spec.id_field.clone(), json!(id.clone()));
                id
            }
        };

        // Parent auto-population never overwrites an explicit value.
        if let (Some(field), Some(parent_id)) = (&state.spec.parent_field, parent) {
            item.entry(field.clone()).or_insert_with(|| json!(parent_id));
        }

        let now = now_rfc3339();
        item.insert("createdAt".to_string(), json!(now.clone()));
        item.insert("updatedAt".to_string(), json!(now));

        let mut items = state.items.lock();
        if items.contains_key(&id) {
            return Err(Error::DuplicateId { id });
        }
        let stored = Value::Object(item);
        items.insert(id, stored.clone());
        Ok(stored)
    }

    /// Full replacement; id and `createdAt` are preserved
    pub fn put(&self, name: &str, id: &str, body: Value) -> Result<Value> {
        let mut item = require_object(body)?;
        let state = self.state(name)?;
        let mut items = state.items.lock();
        let existing = items
            .get(id)
            .ok_or_else(|| Error::not_found(format!("{name}/{id}")))?;

        item.insert(state.spec.id_field.clone(), json!(id));
        if let Some(created) = existing.get("createdAt") {
            item.insert("createdAt".to_string(), created.clone());
        }
        item.insert("updatedAt".to_string(), json!(now_rfc3339()));

        let stored = Value::Object(item);
        items.insert(id.to_string(), stored.clone());
        Ok(stored)
    }

    /// Deep-merge updates; missing intermediate objects are created
    pub fn patch(&self, name: &str, id: &str, body: Value) -> Result<Value> {
        let patch = require_object(body)?;
        let state = self.state(name)?;
        let mut items = state.items.lock();
        let existing = items
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("{name}/{id}")))?;

        let mut patch = Value::Object(patch);
        // The id field is never overwritten.
        if let Some(obj) = patch.as_object_mut() {
            obj.remove(&state.spec.id_field);
        }
        deep_merge(existing, &patch);
        set_field(existing, "updatedAt", json!(now_rfc3339()));
        Ok(existing.clone())
    }

    /// Delete one item
    pub fn delete(&self, name: &str, id: &str) -> Result<()> {
        let state = self.state(name)?;
        let mut items = state.items.lock();
        items
            .shift_remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("{name}/{id}")))
    }

    /// Restore seed data, dropping all live mutations
    ///
    /// With a name, only that resource resets; otherwise all of them.
    pub fn reset(&self, name: Option<&str>) -> Result<()> {
        let resources = self.resources.read();
        let targets: Vec<Arc<ResourceState>> = match name {
            Some(name) => vec![Arc::clone(
                resources
                    .get(name)
                    .ok_or_else(|| Error::not_found(format!("resource '{name}'")))?,
            )],
            None => resources.values().cloned().collect(),
        };
        drop(resources);
        for state in targets {
            let mut items = state.items.lock();
            items.clear();
            for item in &state.seed {
                if let Some(id) = state.item_id(item) {
                    items.insert(id, item.clone());
                }
            }
        }
        Ok(())
    }

    /// Per-resource counts
    pub fn overview(&self) -> Vec<ResourceOverview> {
        self.resources
            .read()
            .values()
            .map(|state| ResourceOverview {
                name: state.spec.name.clone(),
                base_path: state.spec.base_path.clone(),
                count: state.items.lock().len(),
                seed_count: state.seed.len(),
            })
            .collect()
    }

    fn state(&self, name: &str) -> Result<Arc<ResourceState>> {
        self.resources
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("resource '{name}'")))
    }
}

fn require_object(body: Value) -> Result<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(Error::validation("item body must be a JSON object")),
    }
}

fn parent_matches(spec: &ResourceSpec, item: &Value, parent: Option<&str>) -> bool {
    match (&spec.parent_field, parent) {
        (Some(field), Some(parent_id)) => {
            item.get(field).map(value_as_string).as_deref() == Some(parent_id)
        }
        _ => true,
    }
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => value_as_string(x).cmp(&value_as_string(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && patch_value.is_object() => {
                        deep_merge(existing, patch_value);
                    }
                    Some(existing) => *existing = patch_value.clone(),
                    None => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

fn set_field(item: &mut Value, field: &str, value: Value) {
    if let Some(obj) = item.as_object_mut() {
        obj.insert(field.to_string(), value);
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_spec() -> ResourceSpec {
        ResourceSpec {
            name: "users".into(),
            base_path: "/api/users".into(),
            id_field: "id".into(),
            parent_field: None,
            seed: vec![json!({"id": "user-1", "name": "Bob"})],
            id_mode: IdMode::Uuid,
        }
    }

    fn store_with_users() -> ResourceStore {
        let store = ResourceStore::new();
        store.register(users_spec()).unwrap();
        store
    }

    #[test]
    fn create_assigns_id_and_timestamps() {
        let store = store_with_users();
        let created = store.create("users", json!({"name": "Alice"}), None).unwrap();
        let id = created["id"].as_str().unwrap();
        assert!(!id.is_empty());
        assert!(created["createdAt"].is_string());
        assert!(created["updatedAt"].is_string());
    }

    #[test]
    fn duplicate_id_conflicts() {
        let store = store_with_users();
        let err = store
            .create("users", json!({"id": "user-1", "name": "Clone"}), None)
            .unwrap_err();
        assert_eq!(err.code(), "duplicate_id");
    }

    #[test]
    fn list_sorts_and_paginates() {
        let store = store_with_users();
        store.create("users", json!({"name": "Alice"}), None).unwrap();
        let page = store
            .list(
                "users",
                &ListParams {
                    sort: Some("name".into()),
                    ..ListParams::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(page.meta.total, 2);
        assert_eq!(page.data[0]["name"], "Alice");
        assert_eq!(page.data[1]["name"], "Bob");

        let one = store
            .list(
                "users",
                &ListParams {
                    sort: Some("name".into()),
                    limit: Some(1),
                    offset: 1,
                    ..ListParams::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(one.data.len(), 1);
        assert_eq!(one.data[0]["name"], "Bob");
        assert_eq!(one.meta.total, 2);
    }

    #[test]
    fn equality_filters_apply() {
        let store = store_with_users();
        store.create("users", json!({"name": "Alice", "role": "admin"}), None).unwrap();
        store.create("users", json!({"name": "Eve", "role": "viewer"}), None).unwrap();
        let page = store
            .list(
                "users",
                &ListParams {
                    filters: HashMap::from([("role".to_string(), "admin".to_string())]),
                    ..ListParams::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(page.meta.total, 1);
        assert_eq!(page.data[0]["name"], "Alice");
    }

    #[test]
    fn put_preserves_created_at() {
        let store = store_with_users();
        let created = store.create("users", json!({"name": "Alice"}), None).unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        let created_at = created["createdAt"].clone();

        let replaced = store
            .put("users", &id, json!({"name": "Alicia", "id": "ignored"}))
            .unwrap();
        assert_eq!(replaced["id"], json!(id));
        assert_eq!(replaced["createdAt"], created_at);
        assert_eq!(replaced["name"], "Alicia");
        assert!(replaced["updatedAt"].as_str().unwrap() >= created_at.as_str().unwrap());
    }

    #[test]
    fn patch_deep_merges_and_creates_intermediates() {
        let store = store_with_users();
        let patched = store
            .patch(
                "users",
                "user-1",
                json!({"profile": {"address": {"city": "Berlin"}}, "id": "nope"}),
            )
            .unwrap();
        assert_eq!(patched["profile"]["address"]["city"], "Berlin");
        assert_eq!(patched["id"], "user-1");
        assert_eq!(patched["name"], "Bob");
    }

    #[test]
    fn reset_restores_exact_seed() {
        let store = store_with_users();
        store.create("users", json!({"name": "Alice"}), None).unwrap();
        store.delete("users", "user-1").unwrap();
        store.reset(Some("users")).unwrap();

        let page = store.list("users", &ListParams::default(), None).unwrap();
        assert_eq!(page.meta.total, 1);
        assert_eq!(page.data[0], json!({"id": "user-1", "name": "Bob"}));
    }

    #[test]
    fn nested_resources_filter_by_parent() {
        let store = ResourceStore::new();
        store
            .register(ResourceSpec {
                name: "posts".into(),
                base_path: "/api/users/:userId/posts".into(),
                id_field: "id".into(),
                parent_field: Some("userId".into()),
                seed: vec![],
                id_mode: IdMode::Uuid,
            })
            .unwrap();

        let route = store.route("/api/users/42/posts").unwrap();
        assert_eq!(route.resource, "posts");
        assert_eq!(route.parent.as_deref(), Some("42"));
        assert!(route.id.is_none());

        let created = store
            .create("posts", json!({"title": "hi"}), route.parent.as_deref())
            .unwrap();
        assert_eq!(created["userId"], "42");

        // Parent auto-population never overwrites an explicit value.
        let explicit = store
            .create("posts", json!({"title": "x", "userId": "7"}), Some("42"))
            .unwrap();
        assert_eq!(explicit["userId"], "7");

        let for_42 = store.list("posts", &ListParams::default(), Some("42")).unwrap();
        assert_eq!(for_42.meta.total, 1);

        let item_route = store.route("/api/users/42/posts/abc").unwrap();
        assert_eq!(item_route.id.as_deref(), Some("abc"));
    }

    #[test]
    fn sequential_id_mode() {
        let store = ResourceStore::new();
        store
            .register(ResourceSpec {
                name: "orders".into(),
                base_path: "/api/orders".into(),
                id_field: "id".into(),
                parent_field: None,
                seed: vec![],
                id_mode: IdMode::Sequential,
            })
            .unwrap();
        let a = store.create("orders", json!({}), None).unwrap();
        let b = store.create("orders", json!({}), None).unwrap();
        assert_eq!(a["id"], "orders-1");
        assert_eq!(b["id"], "orders-2");
    }

    #[test]
    fn overview_reports_counts() {
        let store = store_with_users();
        store.create("users", json!({"name": "Alice"}), None).unwrap();
        let overview = store.overview();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].count, 2);
        assert_eq!(overview[0].seed_count, 1);
    }
}
