//! Credential store for the access token, refresh token and cached user profile.
//!
//! Partial updates: `save()` only touches the fields it is given. `load()` never
//! fails; backend read errors are logged and the field reads as absent.

use std::sync::Arc;

use serde_json::Value;
use zeroize::Zeroize;

use super::secure::{SecureStorage, StoreError};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";

/// Snapshot of the stored session credentials.
///
/// Token strings are zeroed when the snapshot is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<Value>,
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
    }
}

/// Sole owner of persisted credentials.
pub struct CredentialStore {
    storage: Arc<dyn SecureStorage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Read all three fields fresh from storage.
    pub fn load(&self) -> Credentials {
        Credentials {
            access_token: self.read(ACCESS_TOKEN_KEY),
            refresh_token: self.read(REFRESH_TOKEN_KEY),
            user: self.user(),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    /// Cached user profile; an unparseable blob reads as absent.
    pub fn user(&self) -> Option<Value> {
        let raw = self.read(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                log::warn!("Ignoring unparseable cached user: {}", e);
                None
            }
        }
    }

    /// Persist the given fields immediately; omitted fields are left untouched.
    pub fn save(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: Option<&Value>,
    ) -> Result<(), StoreError> {
        let user_json = user.map(serde_json::to_string).transpose()?;

        self.storage.set(ACCESS_TOKEN_KEY, access_token)?;
        if let Some(token) = refresh_token {
            self.storage.set(REFRESH_TOKEN_KEY, token)?;
        }
        if let Some(json) = user_json {
            self.storage.set(USER_KEY, &json)?;
        }
        Ok(())
    }

    /// Replace only the cached user profile.
    pub fn save_user(&self, user: &Value) -> Result<(), StoreError> {
        let json = serde_json::to_string(user)?;
        self.storage.set(USER_KEY, &json)
    }

    /// Delete all keys. Every key is attempted; the first failure is returned.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut first_err = None;
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.storage.delete(key) {
                log::warn!("Failed to delete {} from secure storage: {}", key, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to read {} from secure storage: {}", key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::secure::MemoryStorage;

    /// Storage whose reads and deletes always fail.
    struct BrokenStorage;

    impl SecureStorage for BrokenStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::OperationFailed("locked".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::OperationFailed("locked".to_string()))
        }

        fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::OperationFailed("locked".to_string()))
        }
    }

    fn memory_store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_load_empty_store() {
        let store = memory_store();
        assert_eq!(store.load(), Credentials::default());
    }

    #[test]
    fn test_save_and_load_all_fields() {
        let store = memory_store();
        let user = json!({"id": 7, "name": "Ada"});
        store.save("access-1", Some("refresh-1"), Some(&user)).unwrap();

        let creds = store.load();
        assert_eq!(creds.access_token.as_deref(), Some("access-1"));
        assert_eq!(creds.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(creds.user, Some(user));
    }

    #[test]
    fn test_partial_save_preserves_refresh_token() {
        let store = memory_store();
        let user = json!({"id": 7});
        store.save("access-1", Some("refresh-1"), Some(&user)).unwrap();

        store.save("access-2", None, None).unwrap();

        let creds = store.load();
        assert_eq!(creds.access_token.as_deref(), Some("access-2"));
        assert_eq!(creds.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(creds.user, Some(user));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = memory_store();
        store.save("a", Some("r"), Some(&json!({}))).unwrap();

        store.clear().unwrap();
        assert_eq!(store.load(), Credentials::default());

        store.clear().unwrap();
        assert_eq!(store.load(), Credentials::default());
    }

    #[test]
    fn test_unparseable_user_reads_as_none() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(USER_KEY, "{not json").unwrap();
        let store = CredentialStore::new(storage);
        assert_eq!(store.user(), None);
    }

    #[test]
    fn test_load_never_fails_on_broken_backend() {
        let store = CredentialStore::new(Arc::new(BrokenStorage));
        assert_eq!(store.load(), Credentials::default());
        assert!(store.save("a", None, None).is_err());
        assert!(store.clear().is_err());
    }
}
