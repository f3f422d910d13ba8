//! Durable store for workflow run records (the persisted step pointer).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indexmap::IndexMap;
use jobhook_types::{CorrelationId, RunRecord};
use serde::{Deserialize, Serialize};

use crate::json_file::{self, StoreError};

/// Shared trait implemented by run persistence backends.
pub trait RunStore: Send + Sync {
    /// Insert `record` unless a run with the same id exists.
    ///
    /// Returns the stored record and `true` when it was newly inserted.
    fn insert_if_absent(&self, record: RunRecord) -> Result<(RunRecord, bool), StoreError>;

    fn get(&self, id: &CorrelationId) -> Result<Option<RunRecord>, StoreError>;

    /// Store the latest state of a run, replacing any previous version.
    fn update(&self, record: &RunRecord) -> Result<(), StoreError>;

    /// Runs whose step pointer is not terminal, oldest first.
    fn unfinished(&self) -> Result<Vec<RunRecord>, StoreError>;
}

#[derive(Clone, Default, Serialize, Deserialize)]
struct RunFile {
    runs: IndexMap<String, RunRecord>,
}

impl RunFile {
    fn insert_if_absent(&mut self, record: RunRecord) -> (RunRecord, bool) {
        if let Some(existing) = self.runs.get(record.id.as_str()) {
            return (existing.clone(), false);
        }
        self.runs.insert(record.id.to_string(), record.clone());
        (record, true)
    }

    fn unfinished(&self) -> Vec<RunRecord> {
        self.runs.values().filter(|run| !run.step.is_terminal()).cloned().collect()
    }
}

/// JSON-backed run store persisted on disk.
pub struct JsonRunStore {
    path: PathBuf,
    runs: Mutex<RunFile>,
}

impl JsonRunStore {
    /// Open (or lazily create) the store file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let file = json_file::load(&path)?;
        Ok(Self {
            path,
            runs: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunStore for JsonRunStore {
    fn insert_if_absent(&self, record: RunRecord) -> Result<(RunRecord, bool), StoreError> {
        let mut runs = self.runs.lock().expect("run lock poisoned");
        let mut next = runs.clone();
        let (record, inserted) = next.insert_if_absent(record);
        if inserted {
            json_file::save(&self.path, &next)?;
            *runs = next;
        }
        Ok((record, inserted))
    }

    fn get(&self, id: &CorrelationId) -> Result<Option<RunRecord>, StoreError> {
        let runs = self.runs.lock().expect("run lock poisoned");
        Ok(runs.runs.get(id.as_str()).cloned())
    }

    fn update(&self, record: &RunRecord) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().expect("run lock poisoned");
        let mut next = runs.clone();
        next.runs.insert(record.id.to_string(), record.clone());
        json_file::save(&self.path, &next)?;
        *runs = next;
        Ok(())
    }

    fn unfinished(&self) -> Result<Vec<RunRecord>, StoreError> {
        let runs = self.runs.lock().expect("run lock poisoned");
        Ok(runs.unfinished())
    }
}

/// In-memory run store primarily used for unit testing.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: Mutex<RunFile>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for InMemoryRunStore {
    fn insert_if_absent(&self, record: RunRecord) -> Result<(RunRecord, bool), StoreError> {
        let mut runs = self.runs.lock().expect("run lock poisoned");
        Ok(runs.insert_if_absent(record))
    }

    fn get(&self, id: &CorrelationId) -> Result<Option<RunRecord>, StoreError> {
        let runs = self.runs.lock().expect("run lock poisoned");
        Ok(runs.runs.get(id.as_str()).cloned())
    }

    fn update(&self, record: &RunRecord) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().expect("run lock poisoned");
        runs.runs.insert(record.id.to_string(), record.clone());
        Ok(())
    }

    fn unfinished(&self) -> Result<Vec<RunRecord>, StoreError> {
        let runs = self.runs.lock().expect("run lock poisoned");
        Ok(runs.unfinished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobhook_types::WorkflowStep;
    use std::fs;
    use tempfile::tempdir;

    fn run(id: &str) -> RunRecord {
        RunRecord::new("data_pipeline", CorrelationId::new(id).unwrap(), "http://example.com")
    }

    #[test]
    fn insert_if_absent_keeps_first_record() {
        let store = InMemoryRunStore::new();
        let (_, inserted) = store.insert_if_absent(run("abc")).unwrap();
        assert!(inserted);

        let mut other = run("abc");
        other.url = "http://elsewhere".into();
        let (existing, inserted) = store.insert_if_absent(other).unwrap();
        assert!(!inserted);
        assert_eq!(existing.url, "http://example.com");
    }

    #[test]
    fn unfinished_skips_terminal_runs() {
        let store = InMemoryRunStore::new();
        store.insert_if_absent(run("a")).unwrap();
        let (mut done, _) = store.insert_if_absent(run("b")).unwrap();
        done.transition(WorkflowStep::Complete);
        store.update(&done).unwrap();

        let ids: Vec<_> = store.unfinished().unwrap().into_iter().map(|run| run.id.to_string()).collect();
        assert_eq!(ids, vec!["a".to_string()]);
    }

    #[test]
    fn json_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs.json");
        let store = JsonRunStore::open(&path).unwrap();
        let (mut record, _) = store.insert_if_absent(run("abc")).unwrap();
        record.trigger_attempted = true;
        record.transition(WorkflowStep::Awaiting);
        store.update(&record).unwrap();
        drop(store);

        let reopened = JsonRunStore::open(&path).unwrap();
        let loaded = reopened.get(&record.id).unwrap().unwrap();
        assert_eq!(loaded.step, WorkflowStep::Awaiting);
        assert!(loaded.trigger_attempted);
        assert_eq!(reopened.unfinished().unwrap().len(), 1);
    }

    #[test]
    fn failed_save_keeps_previous_step() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs.json");
        let store = JsonRunStore::open(&path).unwrap();
        let (mut record, _) = store.insert_if_absent(run("abc")).unwrap();

        let blocker = dir.path().join("runs.json.tmp");
        fs::create_dir(&blocker).unwrap();
        record.transition(WorkflowStep::Awaiting);
        assert!(store.update(&record).is_err());
        assert_eq!(store.get(&record.id).unwrap().unwrap().step, WorkflowStep::Start);
        assert!(store.insert_if_absent(run("other")).is_err());
        assert!(store.get(&CorrelationId::new("other").unwrap()).unwrap().is_none());

        fs::remove_dir(&blocker).unwrap();
        store.update(&record).unwrap();
        let reopened = JsonRunStore::open(&path).unwrap();
        assert_eq!(reopened.get(&record.id).unwrap().unwrap().step, WorkflowStep::Awaiting);
    }

    #[test]
    fn corrupt_file_is_preserved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs.json");
        fs::write(&path, "{ truncated").unwrap();

        let store = JsonRunStore::open(&path).unwrap();
        assert!(store.unfinished().unwrap().is_empty());
        store.insert_if_absent(run("abc")).unwrap();

        let preserved = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .find(|path| path.file_name().unwrap().to_string_lossy().starts_with("runs.json.corrupt"))
            .expect("corrupt file kept");
        assert_eq!(fs::read_to_string(preserved).unwrap(), "{ truncated");
    }
}
