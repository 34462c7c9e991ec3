//! Flat key/value storage port backing the cache.
//!
//! The namespace is assumed to be shared with unrelated data, so callers are
//! responsible for prefixing their keys; `keys_with_prefix` is the only scan
//! primitive the cache needs.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StorageError;

/// Storage port for the cache layer.
///
/// Implement this trait to plug in any flat string key/value store
/// (in-memory, file-backed, an embedded KV engine, ...).
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    /// Retrieve the value for a key.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Create or overwrite the value for a key.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// List every key starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// In-memory backend, used by tests and as the default in-process store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including foreign (non-cache) ones.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// File-backed backend: the whole namespace persisted as one JSON document.
///
/// Write-through on every mutation, so cached values survive process
/// restarts the same way they survive page reloads in a browser store.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileBackend {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StorageError::Deserialization(e.to_string()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StorageError::Backend(e.to_string())),
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let raw = serde_json::to_string(entries)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| StorageError::Backend(e.to_string()))
    }
}

#[async_trait]
impl KvBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap();
        entries.remove(key);
        self.persist(&entries)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let backend = MemoryBackend::new();
        backend.set("a", "1").await.unwrap();

        assert_eq!(backend.get("a").await.unwrap(), Some("1".to_string()));
        assert_eq!(backend.get("b").await.unwrap(), None);

        backend.remove("a").await.unwrap();
        assert_eq!(backend.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_backend_prefix_listing() {
        let backend = MemoryBackend::new();
        backend.set("app:x", "1").await.unwrap();
        backend.set("app:y", "2").await.unwrap();
        backend.set("other", "3").await.unwrap();

        let mut keys = backend.keys_with_prefix("app:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["app:x".to_string(), "app:y".to_string()]);
    }

    #[tokio::test]
    async fn test_file_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.set("app:x", "1").await.unwrap();
            backend.set("gone", "2").await.unwrap();
            backend.remove("gone").await.unwrap();
        }

        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.get("app:x").await.unwrap(), Some("1".to_string()));
        assert_eq!(reopened.get("gone").await.unwrap(), None);
    }

    #[test]
    fn test_file_backend_rejects_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            FileBackend::open(&path),
            Err(StorageError::Deserialization(_))
        ));
    }
}
