//! Persistent storage for the object list and notification history.
//!
//! Each list is one JSON array under a fixed key, stored as `<key>.json` in
//! the data directory. Reads never fail: an absent or malformed blob reads as
//! an empty list (and is logged). Writes report their errors.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::StorageConfig;

/// Storage key of the tracked object list.
pub const OBJECTS_KEY: &str = "guardify_objects";

/// Storage key of the notification history.
pub const NOTIFICATIONS_KEY: &str = "guardify_notifications";

/// Errors raised when writing a list.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The data directory could not be created.
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDirError {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The blob could not be written or removed.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// Blob path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The list could not be serialized.
    #[error("Failed to serialize list: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Result type for storage writes.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// JSON list store rooted at a data directory.
///
/// Clones share one write lock so read-modify-write cycles do not interleave.
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl Storage {
    /// Create a new storage instance.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory to store data files
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Storage at the configured directory, or the platform default.
    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        config
            .data_dir
            .clone()
            .map_or_else(|| Self::new(default_data_dir()), Self::new)
    }

    /// Directory holding the blobs.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Read the list stored under `key`.
    ///
    /// Absent, unreadable or malformed data yields an empty list.
    #[must_use]
    pub fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let path = self.path(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "No stored list, starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "Failed to read stored list");
                return Vec::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(key, error = %e, "Stored list is malformed, treating as empty");
            Vec::new()
        })
    }

    /// Replace the list stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write_list<T: Serialize>(&self, key: &str, items: &[T]) -> StorageResult<()> {
        let _guard = self.lock();
        self.write_unlocked(key, items)
    }

    /// Read, modify and write back the list under `key` as one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the modified list cannot be written.
    pub fn update_list<T, R, F>(&self, key: &str, modify: F) -> StorageResult<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>) -> R,
    {
        let _guard = self.lock();
        let mut items = self.read_list(key);
        let result = modify(&mut items);
        self.write_unlocked(key, &items)?;
        Ok(result)
    }

    /// Delete the blob under `key`. A missing blob is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self, key: &str) -> StorageResult<()> {
        let _guard = self.lock();
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::WriteError { path, source }),
        }
    }

    fn write_unlocked<T: Serialize>(&self, key: &str, items: &[T]) -> StorageResult<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|source| StorageError::CreateDirError {
            path: self.data_dir.clone(),
            source,
        })?;

        let path = self.path(key);
        let content = serde_json::to_string(items)?;
        std::fs::write(&path, content).map_err(|source| StorageError::WriteError { path, source })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

/// Platform default data directory.
///
/// On Linux: `/var/lib/guardify/`.
/// Elsewhere: the platform data directory (e.g. `~/.local/share/guardify/`).
#[must_use]
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/guardify")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "guardify").map_or_else(
            || PathBuf::from("./data"),
            |dirs| dirs.data_dir().to_path_buf(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("data"));
        (dir, storage)
    }

    #[test]
    fn test_absent_list_reads_empty() {
        let (_dir, storage) = storage();
        let items: Vec<String> = storage.read_list(OBJECTS_KEY);
        assert!(items.is_empty());
    }

    #[test]
    fn test_corrupted_list_reads_empty() {
        let (_dir, storage) = storage();
        std::fs::create_dir_all(storage.data_dir()).unwrap();
        std::fs::write(
            storage.data_dir().join("guardify_objects.json"),
            "{not json",
        )
        .unwrap();

        let items: Vec<String> = storage.read_list(OBJECTS_KEY);
        assert!(items.is_empty());
    }

    #[test]
    fn test_wrong_shape_reads_empty() {
        let (_dir, storage) = storage();
        std::fs::create_dir_all(storage.data_dir()).unwrap();
        std::fs::write(
            storage.data_dir().join("guardify_objects.json"),
            r#"{"id": "1"}"#,
        )
        .unwrap();

        let items: Vec<String> = storage.read_list(OBJECTS_KEY);
        assert!(items.is_empty());
    }

    #[test]
    fn test_write_creates_directory() {
        let (_dir, storage) = storage();
        storage
            .write_list(NOTIFICATIONS_KEY, &["a".to_string()])
            .unwrap();
        assert!(storage.data_dir().join("guardify_notifications.json").exists());

        let items: Vec<String> = storage.read_list(NOTIFICATIONS_KEY);
        assert_eq!(items, vec!["a".to_string()]);
    }

    #[test]
    fn test_update_list_returns_closure_result() {
        let (_dir, storage) = storage();
        let len = storage
            .update_list(OBJECTS_KEY, |items: &mut Vec<u32>| {
                items.extend([1, 2, 3]);
                items.len()
            })
            .unwrap();
        assert_eq!(len, 3);
        assert_eq!(storage.read_list::<u32>(OBJECTS_KEY), vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (_dir, storage) = storage();
        storage.write_list(OBJECTS_KEY, &[1u8]).unwrap();
        storage.remove(OBJECTS_KEY).unwrap();
        storage.remove(OBJECTS_KEY).unwrap();
        assert!(storage.read_list::<u8>(OBJECTS_KEY).is_empty());
    }
}
