use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use super::key::CacheKey;

/// The whole persisted document: hex digest to source text, sorted by key.
pub type StoreDocument = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialise store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistent mapping from identity digests to generated source text.
///
/// Reads never fail: an unreadable store behaves as an empty one. Writes
/// surface their errors.
pub trait ImplementationStore: Send + Sync {
    fn load(&self, key: &CacheKey) -> Option<String>;

    fn save(&self, key: &CacheKey, source: &str) -> Result<(), StoreError>;

    /// Deletes an entry, reporting whether it existed.
    fn remove(&self, key: &CacheKey) -> Result<bool, StoreError>;

    fn retrieve(&self, name: &str, signature: &str) -> Option<String> {
        self.load(&CacheKey::derive(name, signature))
    }

    fn archive(&self, name: &str, signature: &str, source: &str) -> Result<(), StoreError> {
        self.save(&CacheKey::derive(name, signature), source)
    }
}

/// A JSON document on disk, reloaded on every operation and rewritten whole on
/// every change.
///
/// Writers within this process are serialized. Separate processes sharing the
/// file are not coordinated; the last writer wins.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of every entry currently on disk.
    pub fn entries(&self) -> StoreDocument {
        self.read_document()
    }

    fn read_document(&self) -> StoreDocument {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return StoreDocument::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "store unreadable, treating as empty");
                return StoreDocument::new();
            }
        };
        if text.trim().is_empty() {
            return StoreDocument::new();
        }
        match serde_json::from_str(&text) {
            Ok(document) => document,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "store is not valid JSON, treating as empty");
                StoreDocument::new()
            }
        }
    }

    /// Writes to a sibling temp file, then renames it over the target so readers
    /// never see a partial document.
    fn write_document(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(io_error)?;

        let mut temp = NamedTempFile::new_in(parent).map_err(io_error)?;
        serde_json::to_writer_pretty(&mut temp, document)?;
        temp.write_all(b"\n").map_err(io_error)?;
        temp.persist(&self.path).map_err(|err| io_error(err.error))?;
        debug!(path = %self.path.display(), entries = document.len(), "store written");
        Ok(())
    }
}

impl ImplementationStore for FileStore {
    fn load(&self, key: &CacheKey) -> Option<String> {
        self.read_document().remove(key.as_str())
    }

    fn save(&self, key: &CacheKey, source: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut document = self.read_document();
        document.insert(key.to_string(), source.to_string());
        self.write_document(&document)
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        let mut document = self.read_document();
        if document.remove(key.as_str()).is_none() {
            return Ok(false);
        }
        self.write_document(&document)?;
        Ok(true)
    }
}

/// Process-local store, for embedding and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CacheKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ImplementationStore for MemoryStore {
    fn load(&self, key: &CacheKey) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn save(&self, key: &CacheKey, source: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.clone(), source.to_string());
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, StoreError> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        assert_eq!(store.retrieve("f", "()"), None);
        store.archive("f", "()", "def f():\n    return 1\n")?;
        assert_eq!(store.retrieve("f", "()").as_deref(), Some("def f():\n    return 1\n"));
        assert!(store.remove(&CacheKey::derive("f", "()"))?);
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn file_store_writes_sorted_pretty_json() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::open(dir.path().join("nested").join("store.json"));
        store.archive("b", "()", "B")?;
        store.archive("a", "()", "A")?;

        let text = fs::read_to_string(store.path())?;
        let first = CacheKey::derive("a", "()").to_string();
        let second = CacheKey::derive("b", "()").to_string();
        let (low, high) = if first < second { (first, second) } else { (second, first) };
        let low_at = text.find(&low).ok_or("missing key")?;
        let high_at = text.find(&high).ok_or("missing key")?;
        assert!(low_at < high_at);
        assert!(text.starts_with("{\n  \""));
        Ok(())
    }
}
