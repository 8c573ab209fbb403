//! Persistent Tier Module
//!
//! Durable key/value backends for the second cache tier. Each backend stores
//! one text blob per namespace; the cache owns the blob format.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

// == Storage Error ==
/// Failures raised by a persistent backend.
///
/// The cache never propagates these; they are logged and swallowed.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying I/O failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Write rejected because the backend is full
    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },

    /// Backend cannot be used at all
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

// == Persistent Store ==
/// A durable text store addressed by namespace.
pub trait PersistentStore: Send + Sync + Debug {
    /// Loads the blob stored under `namespace`, or `None` if nothing is stored.
    fn load(&self, namespace: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the blob stored under `namespace`.
    fn save(&self, namespace: &str, data: &str) -> Result<(), StorageError>;

    /// Deletes the blob stored under `namespace`. Absent blobs are not an error.
    fn delete(&self, namespace: &str) -> Result<(), StorageError>;
}

// == File Store ==
/// Stores each namespace as a JSON file inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a file store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        let file_name: String = namespace
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl PersistentStore for FileStore {
    fn load(&self, namespace: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(namespace)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, namespace: &str, data: &str) -> Result<(), StorageError> {
        let path = self.path_for(namespace);
        let tmp = path.with_extension("json.tmp");

        // Write-then-rename so readers never observe a half-written blob
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn delete(&self, namespace: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(namespace)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// == In-Memory Store ==
/// A process-local store with optional byte quota.
///
/// Clones share the same underlying map, so a clone handed to a new cache
/// instance behaves like storage that survived a restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    blobs: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl InMemoryStore {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects blobs larger than `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            blobs: Arc::default(),
            quota: Some(quota),
        }
    }

    /// Writes a raw blob, bypassing quota checks.
    pub fn put_raw(&self, namespace: &str, data: &str) {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(namespace.to_string(), data.to_string());
    }

    /// Reads a raw blob.
    pub fn get_raw(&self, namespace: &str) -> Option<String> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(namespace)
            .cloned()
    }
}

impl PersistentStore for InMemoryStore {
    fn load(&self, namespace: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get_raw(namespace))
    }

    fn save(&self, namespace: &str, data: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            if data.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    needed: data.len(),
                    quota,
                });
            }
        }
        self.put_raw(namespace, data);
        Ok(())
    }

    fn delete(&self, namespace: &str) -> Result<(), StorageError> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::Unavailable("lock poisoned".to_string()))?
            .remove(namespace);
        Ok(())
    }
}
