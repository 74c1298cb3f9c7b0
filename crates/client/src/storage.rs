//! Durable key/value storage shared by the session, cart, and preference stores.
//!
//! Values are JSON. Writes are applied all-or-nothing: a multi-key update
//! either lands completely or not at all, so a reader never sees an access
//! token from one login next to a refresh token from another.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Errors raised while persisting state.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize stored value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Synchronous durable key/value storage.
///
/// Reads never fail: a missing or unreadable entry is reported as absent.
/// Writes are durable by the time they return `Ok`.
pub trait KeyValueStorage: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write several keys as one atomic update.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the update could not be made durable, in
    /// which case none of the keys were changed.
    fn set_many(&self, entries: &[(&str, Value)]) -> Result<(), StorageError>;

    /// Remove several keys as one atomic update.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the update could not be made durable.
    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError>;

    /// Write a single key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write could not be made durable.
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.set_many(&[(key, value)])
    }

    /// Remove a single key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the removal could not be made durable.
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_many(&[key])
    }
}

/// Read and decode a typed value, treating a malformed entry as absent.
pub fn load<T: DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Option<T> {
    let value = storage.get(key)?;
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(key, error = %e, "Ignoring malformed stored value");
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// File Storage
// =============================================================================

/// Storage backed by a single JSON document on disk.
///
/// Every update writes the whole document to a temporary sibling file and
/// renames it over the original, so a crash mid-write leaves the previous
/// document intact.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileStorage {
    /// Open the document at `path`, creating parent directories as needed.
    ///
    /// A missing file starts empty. A corrupt file is logged and also starts
    /// empty; it is replaced on the next write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the parent directory cannot be created
    /// or the file exists but cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "State file is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `next` and only then swap it in.
    fn commit(
        &self,
        entries: &mut BTreeMap<String, Value>,
        next: BTreeMap<String, Value>,
    ) -> Result<(), StorageError> {
        let contents = serde_json::to_vec_pretty(&next)?;
        let tmp = self.path.with_extension("json.tmp");
        write_synced(&tmp, &contents).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        sync_parent(&self.path);
        *entries = next;
        Ok(())
    }
}

/// Write `contents` and flush them to disk before returning.
fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// Flush the directory entry written by the rename. Errors are logged only.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        warn!(path = %parent.display(), error = %e, "Failed to sync storage directory");
    }
}

#[cfg(not(unix))]
const fn sync_parent(_path: &Path) {}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    fn set_many(&self, updates: &[(&str, Value)]) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries);
        let mut next = entries.clone();
        for (key, value) in updates {
            next.insert((*key).to_string(), value.clone());
        }
        self.commit(&mut entries, next)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries);
        if !keys.iter().any(|key| entries.contains_key(*key)) {
            return Ok(());
        }
        let mut next = entries.clone();
        for key in keys {
            next.remove(*key);
        }
        self.commit(&mut entries, next)
    }
}

// =============================================================================
// Memory Storage
// =============================================================================

/// Process-local storage, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    fn set_many(&self, updates: &[(&str, Value)]) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries);
        for (key, value) in updates {
            entries.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries);
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}
