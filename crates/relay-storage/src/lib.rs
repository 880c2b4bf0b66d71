//! Page storage abstraction for the auth relay.
//!
//! The relay reads and writes a handful of well-known keys in the hosting
//! page's origin-scoped key/value store:
//! - relayed session keys (`<ns>_auth_token`, `<ns>_auth_user`, `<ns>_auth_timestamp`)
//! - the staged Manual Auth Record (`<ns>_manual_token`, `<ns>_manual_user`)
//!
//! Hosts plug their store in through [`PageStorage`]; [`MemoryStorage`] backs
//! tests and the simulator.

mod keys;
mod records;
mod traits;

pub use keys::StorageKeys;
pub use records::{AuthRecords, ManualRecord, RelayedAuth};
pub use traits::PageStorage;

use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Host storage backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Write rejected because the store is full
    #[error("Storage quota exceeded writing {0}")]
    QuotaExceeded(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// In-memory storage with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once keys plus values exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Copy of every stored entry.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.data.lock().clone()
    }

    fn used_bytes(data: &HashMap<String, String>) -> usize {
        data.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl PageStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock();
        if let Some(quota) = self.quota_bytes {
            let replaced = data.get(key).map(|old| key.len() + old.len()).unwrap_or(0);
            let after = Self::used_bytes(&data) - replaced + key.len() + value.len();
            if after > quota {
                return Err(StorageError::QuotaExceeded(key.to_string()));
            }
        }
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }
}
