use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const KEY_ACCESS_TOKEN: &str = "accessToken";
pub const KEY_REFRESH_TOKEN: &str = "refreshToken";
pub const KEY_PENDING_EMAIL: &str = "pendingEmail";
pub const KEY_USER: &str = "user";

/// Durable secure key-value storage. Each call is atomic on its own; there
/// are no cross-key transactions.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// OS keychain / secret service backed store, one entry per key.
#[derive(Clone)]
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(&self.service, key).map_err(|_| StoreError::Unavailable)
    }

    pub fn is_available(&self) -> bool {
        let Ok(entry) = self.entry(KEY_ACCESS_TOKEN) else {
            return false;
        };

        match entry.get_password() {
            Ok(_) => true,
            Err(keyring::Error::NoEntry) => true,
            Err(keyring::Error::BadEncoding(_)) => true,
            Err(keyring::Error::Ambiguous(_)) => true,
            Err(keyring::Error::NoStorageAccess(_)) => false,
            Err(keyring::Error::PlatformFailure(_)) => false,
            Err(_) => false,
        }
    }
}

#[async_trait]
impl TokenStore for KeyringTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entry = self.entry(key)?;

        match entry.get_password() {
            Ok(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::NoStorageAccess(_)) => Err(StoreError::Unavailable),
            Err(e) => Err(StoreError::Read(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let entry = self.entry(key)?;
        entry
            .set_password(value)
            .map_err(|e| StoreError::Write(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let entry = self.entry(key)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(keyring::Error::NoStorageAccess(_)) => Err(StoreError::Unavailable),
            Err(e) => Err(StoreError::Write(e.to_string())),
        }
    }
}

/// Process-local store, used when the OS keychain is unavailable.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.lock().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}
