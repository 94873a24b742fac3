//! Mock registry: the single owner of mock definitions
//!
//! Reads are served from an immutable snapshot behind an atomic pointer
//! swap: readers clone an `Arc` under a momentary read lock, writers build a
//! whole new snapshot and swap it in. A reader therefore always sees either
//! the pre-change or the post-change set, never a mix.
//!
//! Change events fire synchronously after the swap, outside any lock, so
//! listeners may call back into the registry.

use crate::matcher::MatcherIndex;
use crate::model::{Mock, MockKind};
use crate::{Error, Result};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Immutable view of the registry contents
pub struct RegistrySnapshot {
    mocks: Vec<Arc<Mock>>,
    by_id: HashMap<String, usize>,
    http_index: MatcherIndex,
}

impl RegistrySnapshot {
    fn build(mocks: Vec<Arc<Mock>>) -> Self {
        let by_id = mocks
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();
        let http_index = MatcherIndex::build(&mocks);
        Self {
            mocks,
            by_id,
            http_index,
        }
    }

    /// All mocks in insertion order
    pub fn mocks(&self) -> &[Arc<Mock>] {
        &self.mocks
    }

    /// Look up one mock
    pub fn get(&self, id: &str) -> Option<&Arc<Mock>> {
        self.by_id.get(id).map(|&i| &self.mocks[i])
    }

    /// The matcher index over enabled HTTP mocks
    pub fn http_index(&self) -> &MatcherIndex {
        &self.http_index
    }

    /// Count of mocks per kind (enabled or not)
    pub fn counts_by_kind(&self) -> HashMap<MockKind, usize> {
        let mut counts = HashMap::new();
        for mock in &self.mocks {
            *counts.entry(mock.kind()).or_insert(0) += 1;
        }
        counts
    }
}

/// A change published by the registry
#[derive(Clone)]
pub enum RegistryEvent {
    Created(Arc<Mock>),
    Updated { old: Arc<Mock>, new: Arc<Mock> },
    Deleted(Arc<Mock>),
    /// The whole collection was swapped atomically
    Replaced,
}

impl std::fmt::Debug for RegistryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created(m) => write!(f, "Created({})", m.id),
            Self::Updated { new, .. } => write!(f, "Updated({})", new.id),
            Self::Deleted(m) => write!(f, "Deleted({})", m.id),
            Self::Replaced => write!(f, "Replaced"),
        }
    }
}

/// Receives registry change events synchronously
pub trait RegistryListener: Send + Sync {
    fn on_event(&self, event: &RegistryEvent);
}

impl<F: Fn(&RegistryEvent) + Send + Sync> RegistryListener for F {
    fn on_event(&self, event: &RegistryEvent) {
        self(event);
    }
}

/// Filter for [`MockRegistry::list`]
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub enabled: Option<bool>,
    pub kind: Option<MockKind>,
}

/// In-memory store of mock definitions
pub struct MockRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    listeners: RwLock<Vec<Arc<dyn RegistryListener>>>,
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::build(Vec::new()))),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Current snapshot; cheap to call on the request path
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Register a change listener; registration order is delivery order
    pub fn subscribe(&self, listener: Arc<dyn RegistryListener>) {
        self.listeners.write().push(listener);
    }

    fn emit(&self, event: &RegistryEvent) {
        let listeners: Vec<Arc<dyn RegistryListener>> = self.listeners.read().clone();
        for listener in listeners {
            listener.on_event(event);
        }
    }

    /// Create a mock; assigns an id when the definition carries none
    pub fn create(&self, mut mock: Mock) -> Result<Arc<Mock>> {
        mock.validate()?;
        let created;
        {
            let mut guard = self.snapshot.write();
            let snapshot = guard.clone();
            if mock.id.is_empty() {
                mock.id = assign_id(&snapshot);
            } else if snapshot.get(&mock.id).is_some() {
                return Err(Error::DuplicateId { id: mock.id });
            }
            created = Arc::new(mock);
            let mut mocks = snapshot.mocks.clone();
            mocks.push(Arc::clone(&created));
            *guard = Arc::new(RegistrySnapshot::build(mocks));
        }
        debug!(id = %created.id, kind = created.kind().as_str(), "mock created");
        self.emit(&RegistryEvent::Created(Arc::clone(&created)));
        Ok(created)
    }

    /// Replace a mock definition, keeping its identity and position
    pub fn update(&self, id: &str, mut mock: Mock) -> Result<Arc<Mock>> {
        mock.id = id.to_string();
        mock.validate()?;
        let old;
        let new;
        {
            let mut guard = self.snapshot.write();
            let snapshot = guard.clone();
            let Some(&idx) = snapshot.by_id.get(id) else {
                return Err(Error::not_found(format!("mock '{id}'")));
            };
            old = Arc::clone(&snapshot.mocks[idx]);
            new = Arc::new(mock);
            let mut mocks = snapshot.mocks.clone();
            mocks[idx] = Arc::clone(&new);
            *guard = Arc::new(RegistrySnapshot::build(mocks));
        }
        debug!(id = %id, "mock updated");
        self.emit(&RegistryEvent::Updated {
            old,
            new: Arc::clone(&new),
        });
        Ok(new)
    }

    /// Flip only the enabled flag
    pub fn toggle(&self, id: &str, enabled: bool) -> Result<Arc<Mock>> {
        let current = self
            .snapshot()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("mock '{id}'")))?;
        let mut updated = (*current).clone();
        updated.enabled = Some(enabled);
        self.update(id, updated)
    }

    /// Delete a mock
    pub fn delete(&self, id: &str) -> Result<()> {
        let removed;
        {
            let mut guard = self.snapshot.write();
            let snapshot = guard.clone();
            let Some(&idx) = snapshot.by_id.get(id) else {
                return Err(Error::not_found(format!("mock '{id}'")));
            };
            let mut mocks = snapshot.mocks.clone();
            removed = mocks.remove(idx);
            *guard = Arc::new(RegistrySnapshot::build(mocks));
        }
        debug!(id = %id, "mock deleted");
        self.emit(&RegistryEvent::Deleted(removed));
        Ok(())
    }

    /// Look up one mock
    pub fn get(&self, id: &str) -> Option<Arc<Mock>> {
        self.snapshot().get(id).cloned()
    }

    /// List mocks in insertion order, optionally filtered
    pub fn list(&self, filter: &ListFilter) -> Vec<Arc<Mock>> {
        self.snapshot()
            .mocks()
            .iter()
            .filter(|m| filter.enabled.is_none_or(|e| m.is_enabled() == e))
            .filter(|m| filter.kind.is_none_or(|k| m.kind() == k))
            .cloned()
            .collect()
    }

    /// Atomically replace the whole collection
    ///
    /// Ids are assigned for entries without one; a duplicate id inside the
    /// new collection fails the whole operation with no change applied.
    pub fn replace_all(&self, mocks: Vec<Mock>) -> Result<Vec<Arc<Mock>>> {
        for mock in &mocks {
            mock.validate()?;
        }
        let installed;
        {
            let mut guard = self.snapshot.write();
            let mut seen = HashSet::new();
            let mut next: Vec<Arc<Mock>> = Vec::with_capacity(mocks.len());
            for mut mock in mocks {
                if mock.id.is_empty() {
                    mock.id = fresh_id(|candidate| seen.contains(candidate));
                }
                if !seen.insert(mock.id.clone()) {
                    return Err(Error::DuplicateId { id: mock.id });
                }
                next.push(Arc::new(mock));
            }
            installed = next.clone();
            *guard = Arc::new(RegistrySnapshot::build(next));
        }
        debug!(count = installed.len(), "registry replaced");
        self.emit(&RegistryEvent::Replaced);
        Ok(installed)
    }
}

fn assign_id(snapshot: &RegistrySnapshot) -> String {
    fresh_id(|candidate| snapshot.get(candidate).is_some())
}

fn fresh_id(taken: impl Fn(&str) -> bool) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    loop {
        let mut rng = rand::rng();
        let token: String = (0..12)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        let id = format!("mk_{token}");
        if !taken(&id) {
            return id;
        }
    }
}
