//! Local key-value store adapter.
//!
//! The native binding exposes string get/set/remove. `MemoryStore` backs
//! tests; `FileStore` persists a JSON map with restricted permissions (0600)
//! for the developer CLI.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{HextokError, HextokResult};

/// Async string store contract of the native storage module.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_item(&self, key: &str, value: &str) -> HextokResult<()>;
    async fn get_item(&self, key: &str) -> HextokResult<Option<String>>;
    async fn remove_item(&self, key: &str) -> HextokResult<()>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_item(&self, key: &str, value: &str) -> HextokResult<()> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_item(&self, key: &str) -> HextokResult<Option<String>> {
        Ok(self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn remove_item(&self, key: &str) -> HextokResult<()> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// JSON file store. Every write rewrites the whole map.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> HextokResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|err| {
            HextokError::storage(format!("Failed to read {}", self.path.display()))
                .with_details(err.to_string())
        })?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|err| {
            HextokError::storage(format!("Failed to parse {}", self.path.display()))
                .with_details(err.to_string())
        })
    }

    /// Load-modify-save under the file lock. `apply` returns whether the map
    /// changed.
    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> HextokResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.load()?;
        if apply(&mut items) {
            self.save(&items)?;
        }
        Ok(())
    }

    fn save(&self, items: &BTreeMap<String, String>) -> HextokResult<()> {
        let io_err = |what: &str, err: io::Error| {
            HextokError::storage(format!("Failed to {what} {}", self.path.display()))
                .with_details(err.to_string())
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| io_err("create parent of", err))?;
        }

        let contents = serde_json::to_string_pretty(items)
            .map_err(|err| HextokError::storage("Failed to serialize store").with_details(err.to_string()))?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .map_err(|err| io_err("open", err))?;
        file.write_all(contents.as_bytes())
            .map_err(|err| io_err("write", err))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn set_item(&self, key: &str, value: &str) -> HextokResult<()> {
        self.update(|items| {
            items.insert(key.to_string(), value.to_string());
            true
        })
    }

    async fn get_item(&self, key: &str) -> HextokResult<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    async fn remove_item(&self, key: &str) -> HextokResult<()> {
        self.update(|items| items.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        store.set_item("k", "v").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("v"));
        store.remove_item("k").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        FileStore::new(&path)
            .set_item("hextok_session", "bearer")
            .await
            .unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get_item("hextok_session").await.unwrap().as_deref(),
            Some("bearer")
        );

        reopened.remove_item("hextok_session").await.unwrap();
        assert_eq!(reopened.get_item("hextok_session").await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        FileStore::new(&path).set_item("k", "v").await.unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{not json").unwrap();

        let err = FileStore::new(&path).get_item("k").await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Storage);
    }
}
