//! String-blob persistence backends.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

/// Durable key/value storage of JSON text blobs.
///
/// Implementations must be safe to call from any thread. Calls are made while
/// the store's lock is held, so they should be short.
pub trait KeyValueStore: Send + Sync {
    /// Reads the blob stored under `key`.
    ///
    /// # Errors
    /// Returns [`PersistError`] when the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;

    /// Replaces the blob stored under `key`.
    ///
    /// # Errors
    /// Returns [`PersistError`] when the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistError>;

    /// Deletes the blob stored under `key`; absent keys are not an error.
    ///
    /// # Errors
    /// Returns [`PersistError`] when the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// Persistence failures.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("storage io failure for key {key}: {source}")]
    Io {
        /// Affected key.
        key: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Keys are limited to `[A-Za-z0-9_-]`.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    /// Blob encoding failure.
    #[error("storage encoding failure: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Volatile backend, used in tests and when no data directory is set.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash never leaves a half-written blob behind.
#[derive(Debug, Clone)]
pub struct JsonFileKeyValueStore {
    dir: PathBuf,
}

impl JsonFileKeyValueStore {
    /// Opens (and creates, if needed) the backing directory.
    ///
    /// # Errors
    /// Returns [`PersistError::Io`] when the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PersistError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !valid {
            return Err(PersistError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for JsonFileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let path = self.path_for(key)?;
        let staging = path.with_extension("json.tmp");
        let io_error = |source| PersistError::Io {
            key: key.to_string(),
            source,
        };
        fs::write(&staging, value).map_err(io_error)?;
        fs::rename(&staging, &path).map_err(io_error)
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}
