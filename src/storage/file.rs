//! File-backed key/value store
//!
//! All keys live in a single JSON object:
//!
//! ```text
//! ~/.kage/storage.json
//! {"token": "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOi..."}
//! ```
//!
//! Writes go to a sibling temp file which is then renamed over the original,
//! so a crash mid-write leaves either the old or the new object on disk.

use super::{KeyValueStore, StorageError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`.
    ///
    /// The parent directory is created if it does not exist yet. The file
    /// itself is only written on the first `set`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = expand_tilde(&path.into());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Io(format!("{}: {}", parent.display(), e)))?;
            }
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(StorageError::Io(format!("{}: {}", self.path.display(), e))),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        let io_err = |e: std::io::Error| StorageError::Io(format!("{}: {}", tmp.display(), e));

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // the file holds a bearer credential: owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        // a leftover temp file would keep its old mode
        let _ = std::fs::remove_file(&tmp);
        let mut file = options.open(&tmp).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StorageError::Io(format!("{}: {}", self.path.display(), e)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    /// Remove a key. A file that no longer parses is reset to an empty
    /// object, so a corrupt store can always be cleared.
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = match self.read_all() {
            Ok(entries) => entries,
            Err(StorageError::Serialization(e)) => {
                warn!(path = %self.path.display(), error = %e, "Store unreadable, resetting it");
                return self.write_all(&BTreeMap::new());
            }
            Err(e) => return Err(e),
        };
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_all(&entries)
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (FileStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path().join("nested").join("storage.json")).unwrap();
        (store, temp)
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let (store, _temp) = store();
        assert!(store.get("token").unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_set_persists_across_instances() {
        let (store, _temp) = store();
        store.set("token", "abc").unwrap();

        let reopened = FileStore::new(store.path().to_path_buf()).unwrap();
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_remove_keeps_other_keys() {
        let (store, _temp) = store();
        store.set("token", "abc").unwrap();
        store.set("theme", "dark").unwrap();

        store.remove("token").unwrap();
        store.remove("token").unwrap();

        assert!(store.get("token").unwrap().is_none());
        assert_eq!(store.get("theme").unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let (store, _temp) = store();
        store.set("token", "abc").unwrap();
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let (store, _temp) = store();
        std::fs::write(store.path(), b"{not json").unwrap();

        let err = store.get("token").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_remove_resets_truncated_file() {
        let (store, _temp) = store();
        std::fs::write(store.path(), br#"{"token": "abc""#).unwrap();

        store.remove("token").unwrap();
        store.remove("token").unwrap();

        assert!(store.get("token").unwrap().is_none());
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.trim(), "{}");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _temp) = store();
        store.set("token", "abc").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
