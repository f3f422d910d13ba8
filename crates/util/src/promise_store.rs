//! Durable store for single-assignment promises.
//!
//! A promise is created once per correlation id and resolved at most once.
//! Repeat deliveries carrying the same idempotency key are reported as
//! duplicates; a later resolution with a different key loses to the first.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use indexmap::IndexMap;
use jobhook_types::{CorrelationId, PromiseRecord, PromiseState, ResolveOutcome};
use serde::{Deserialize, Serialize};

use crate::json_file::{self, StoreError};

/// Shared trait implemented by promise persistence backends.
pub trait PromiseStore: Send + Sync {
    /// Create a pending promise for `id`, or return the existing one untouched.
    fn create(&self, id: &CorrelationId) -> Result<PromiseRecord, StoreError>;

    /// Fetch the promise for `id`, if any.
    fn get(&self, id: &CorrelationId) -> Result<Option<PromiseRecord>, StoreError>;

    /// Resolve the promise for `id` with a JSON-encoded payload.
    fn resolve(&self, id: &CorrelationId, data: String, idempotency_key: &str) -> Result<ResolveOutcome, StoreError>;
}

#[derive(Clone, Default, Serialize, Deserialize)]
struct PromiseFile {
    promises: IndexMap<String, PromiseRecord>,
}

impl PromiseFile {
    /// Returns the record and whether it was newly inserted.
    fn create(&mut self, id: &CorrelationId) -> (PromiseRecord, bool) {
        if let Some(existing) = self.promises.get(id.as_str()) {
            return (existing.clone(), false);
        }
        let record = PromiseRecord::pending(id.clone());
        self.promises.insert(id.to_string(), record.clone());
        (record, true)
    }

    fn get(&self, id: &CorrelationId) -> Option<PromiseRecord> {
        self.promises.get(id.as_str()).cloned()
    }

    fn resolve(&mut self, id: &CorrelationId, data: String, idempotency_key: &str) -> ResolveOutcome {
        let Some(record) = self.promises.get_mut(id.as_str()) else {
            return ResolveOutcome::Unknown;
        };
        if let PromiseState::Resolved {
            idempotency_key: existing, ..
        } = &record.state
        {
            return if existing == idempotency_key {
                ResolveOutcome::Duplicate
            } else {
                ResolveOutcome::AlreadyResolved
            };
        }
        record.state = PromiseState::Resolved {
            data,
            idempotency_key: idempotency_key.to_string(),
            resolved_at: Utc::now(),
        };
        ResolveOutcome::Resolved
    }
}

/// JSON-backed promise store persisted on disk.
pub struct JsonPromiseStore {
    path: PathBuf,
    promises: Mutex<PromiseFile>,
}

impl JsonPromiseStore {
    /// Open (or lazily create) the store file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let file = json_file::load(&path)?;
        Ok(Self {
            path,
            promises: Mutex::new(file),
        })
    }

    /// Access the underlying store path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PromiseStore for JsonPromiseStore {
    fn create(&self, id: &CorrelationId) -> Result<PromiseRecord, StoreError> {
        let mut promises = self.promises.lock().expect("promise lock poisoned");
        let mut next = promises.clone();
        let (record, inserted) = next.create(id);
        if inserted {
            // memory only advances once the file does
            json_file::save(&self.path, &next)?;
            *promises = next;
        }
        Ok(record)
    }

    fn get(&self, id: &CorrelationId) -> Result<Option<PromiseRecord>, StoreError> {
        let promises = self.promises.lock().expect("promise lock poisoned");
        Ok(promises.get(id))
    }

    fn resolve(&self, id: &CorrelationId, data: String, idempotency_key: &str) -> Result<ResolveOutcome, StoreError> {
        let mut promises = self.promises.lock().expect("promise lock poisoned");
        let mut next = promises.clone();
        let outcome = next.resolve(id, data, idempotency_key);
        if outcome.took_effect() {
            json_file::save(&self.path, &next)?;
            *promises = next;
        }
        Ok(outcome)
    }
}

/// In-memory promise store primarily used for unit testing.
#[derive(Default)]
pub struct InMemoryPromiseStore {
    promises: Mutex<PromiseFile>,
}

impl InMemoryPromiseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PromiseStore for InMemoryPromiseStore {
    fn create(&self, id: &CorrelationId) -> Result<PromiseRecord, StoreError> {
        let mut promises = self.promises.lock().expect("promise lock poisoned");
        Ok(promises.create(id).0)
    }

    fn get(&self, id: &CorrelationId) -> Result<Option<PromiseRecord>, StoreError> {
        let promises = self.promises.lock().expect("promise lock poisoned");
        Ok(promises.get(id))
    }

    fn resolve(&self, id: &CorrelationId, data: String, idempotency_key: &str) -> Result<ResolveOutcome, StoreError> {
        let mut promises = self.promises.lock().expect("promise lock poisoned");
        Ok(promises.resolve(id, data, idempotency_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn id(value: &str) -> CorrelationId {
        CorrelationId::new(value).unwrap()
    }

    #[test]
    fn create_is_idempotent() {
        let store = InMemoryPromiseStore::new();
        let first = store.create(&id("abc")).unwrap();
        let second = store.create(&id("abc")).unwrap();
        assert_eq!(first, second);
        assert!(!second.is_resolved());
    }

    #[test]
    fn resolve_unknown_id_is_reported_not_raised() {
        let store = InMemoryPromiseStore::new();
        let outcome = store.resolve(&id("missing"), "\"v\"".into(), "missing").unwrap();
        assert_eq!(outcome, ResolveOutcome::Unknown);
        assert!(store.get(&id("missing")).unwrap().is_none());
    }

    #[test]
    fn duplicate_delivery_is_deduplicated() {
        let store = InMemoryPromiseStore::new();
        store.create(&id("abc")).unwrap();
        assert_eq!(store.resolve(&id("abc"), "\"first\"".into(), "abc").unwrap(), ResolveOutcome::Resolved);
        assert_eq!(store.resolve(&id("abc"), "\"first\"".into(), "abc").unwrap(), ResolveOutcome::Duplicate);
        assert_eq!(
            store.resolve(&id("abc"), "\"second\"".into(), "other-key").unwrap(),
            ResolveOutcome::AlreadyResolved
        );
        let record = store.get(&id("abc")).unwrap().unwrap();
        assert_eq!(record.data(), Some("\"first\""));
    }

    #[test]
    fn json_store_persists_resolution() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("promises.json");
        let store = JsonPromiseStore::open(&path).unwrap();
        store.create(&id("abc")).unwrap();
        store.resolve(&id("abc"), "\"done\"".into(), "abc").unwrap();
        drop(store);

        let reloaded = JsonPromiseStore::open(&path).unwrap();
        let record = reloaded.get(&id("abc")).unwrap().unwrap();
        assert_eq!(record.value(), Some(serde_json::Value::String("done".into())));
    }

    #[test]
    fn json_store_persists_pending_promise() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("promises.json");
        let store = JsonPromiseStore::open(&path).unwrap();
        store.create(&id("abc")).unwrap();
        drop(store);

        let reloaded = JsonPromiseStore::open(&path).unwrap();
        assert!(!reloaded.get(&id("abc")).unwrap().unwrap().is_resolved());
    }

    #[test]
    fn invalid_json_is_set_aside_before_starting_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("promises.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonPromiseStore::open(&path).unwrap();
        assert!(store.get(&id("abc")).unwrap().is_none());
        store.create(&id("abc")).unwrap();

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.file_name().unwrap().to_string_lossy().starts_with("promises.json.corrupt"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "not json");
    }

    #[test]
    fn failed_save_leaves_promise_pending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("promises.json");
        let store = JsonPromiseStore::open(&path).unwrap();
        store.create(&id("abc")).unwrap();

        let blocker = dir.path().join("promises.json.tmp");
        fs::create_dir(&blocker).unwrap();
        assert!(store.resolve(&id("abc"), "\"done\"".into(), "abc").is_err());
        assert!(!store.get(&id("abc")).unwrap().unwrap().is_resolved());
        assert!(store.create(&id("other")).is_err());
        assert!(store.get(&id("other")).unwrap().is_none());

        fs::remove_dir(&blocker).unwrap();
        assert_eq!(store.resolve(&id("abc"), "\"done\"".into(), "abc").unwrap(), ResolveOutcome::Resolved);
        let reloaded = JsonPromiseStore::open(&path).unwrap();
        assert!(reloaded.get(&id("abc")).unwrap().unwrap().is_resolved());
    }

    #[test]
    fn concurrent_resolutions_resolve_exactly_once() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonPromiseStore::open(dir.path().join("promises.json")).unwrap());
        store.create(&id("shared")).unwrap();
        store.create(&id("bystander")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|index| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .resolve(&id("shared"), format!("\"{index}\""), &format!("key-{index}"))
                        .unwrap()
                })
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|outcome| outcome.took_effect()).count(), 1);
        assert!(!store.get(&id("bystander")).unwrap().unwrap().is_resolved());
    }
}
