//! Client-side persisted state
//!
//! - Memory: in-process map, lost when the process exits
//! - File: JSON object on disk, survives restarts
//!
//! The only value the client persists is the raw credential, stored under
//! [`CREDENTIAL_KEY`].

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::auth::Credential;
use std::sync::Arc;
use thiserror::Error;

/// Storage key holding the raw credential string
pub const CREDENTIAL_KEY: &str = "token";

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Synchronous string key/value store
///
/// Each operation is an atomic read, replace or delete of a single key.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A [`KeyValueStore`] bound to the credential key
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(backend, CREDENTIAL_KEY)
    }

    pub fn with_key(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Credential-less store backed by memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the persisted credential. Empty strings count as absent.
    pub fn load(&self) -> Result<Option<Credential>, StorageError> {
        Ok(self
            .backend
            .get(&self.key)?
            .filter(|raw| !raw.is_empty())
            .map(Credential::new))
    }

    pub fn save(&self, credential: &Credential) -> Result<(), StorageError> {
        self.backend.set(&self.key, credential.as_str())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.backend.remove(&self.key)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_store_roundtrip() {
        let store = CredentialStore::in_memory();
        assert!(store.load().unwrap().is_none());

        store.save(&Credential::new("abc.def.ghi")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().as_str(), "abc.def.ghi");

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_credential_store_clear_is_idempotent() {
        let store = CredentialStore::in_memory();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_credential_store_empty_value_is_absent() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(CREDENTIAL_KEY, "").unwrap();

        let store = CredentialStore::new(backend);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_credential_store_custom_key() {
        let backend = Arc::new(MemoryStore::new());
        let store = CredentialStore::with_key(backend.clone(), "kage.token");
        store.save(&Credential::new("t")).unwrap();

        assert_eq!(backend.get("kage.token").unwrap().as_deref(), Some("t"));
        assert!(backend.get(CREDENTIAL_KEY).unwrap().is_none());
    }
}
