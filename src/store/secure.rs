//! Secure key-value storage backends.
//!
//! `KeychainStorage` uses the `keyring` crate so tokens land in the platform
//! credential store, never in plain files. A missing entry reads as `None`
//! and deleting a missing entry succeeds.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use keyring::Entry;
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Keychain operation failed: {0}")]
    OperationFailed(String),
    #[error("Failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<keyring::Error> for StoreError {
    fn from(err: keyring::Error) -> Self {
        StoreError::OperationFailed(err.to_string())
    }
}

/// String-keyed secure storage.
///
/// Implementations must fail closed: reading an absent key yields `Ok(None)`.
pub trait SecureStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Idempotent: deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

// ── Keychain ─────────────────────────────────────────────────────────────────

/// OS keychain storage, one entry per key under a fixed service name.
pub struct KeychainStorage {
    service: String,
}

impl KeychainStorage {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl SecureStorage for KeychainStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::from(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted, idempotent
            Err(e) => Err(StoreError::from(e)),
        }
    }
}

// ── Memory ───────────────────────────────────────────────────────────────────

/// Process-local storage. Values are zeroed when overwritten or deleted.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SecureStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(mut old) = self.lock().insert(key.to_string(), value.to_string()) {
            old.zeroize();
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        if let Some(mut old) = self.lock().remove(key) {
            old.zeroize();
        }
        Ok(())
    }
}
