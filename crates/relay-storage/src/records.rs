//! High-level API for the relay's auth records.

use crate::{PageStorage, StorageError, StorageKeys, StorageResult};
use serde_json::Value;
use std::sync::Arc;

/// Session data last written by a relay broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayedAuth {
    pub token: String,
    pub user: Value,
    /// Capture time, ms since epoch
    pub timestamp: i64,
}

/// Fallback session staged by other site code for the relay to pick up.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualRecord {
    pub token: String,
    pub user: Value,
}

/// Reads and writes the relay's well-known keys.
#[derive(Clone)]
pub struct AuthRecords {
    storage: Arc<dyn PageStorage>,
    keys: StorageKeys,
}

impl AuthRecords {
    pub fn new(storage: Arc<dyn PageStorage>, namespace: &str) -> Self {
        Self {
            storage,
            keys: StorageKeys::new(namespace),
        }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    // ==========================================
    // Relayed session
    // ==========================================

    /// Persist a relayed session under the three auth keys.
    ///
    /// Stops at the first failing write.
    pub fn store_relayed(&self, token: &str, user: &Value, timestamp: i64) -> StorageResult<()> {
        let user_json =
            serde_json::to_string(user).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(&self.keys.auth_token(), token)?;
        self.storage.set(&self.keys.auth_user(), &user_json)?;
        self.storage
            .set(&self.keys.auth_timestamp(), &timestamp.to_string())?;
        tracing::debug!(namespace = %self.keys.namespace(), "Stored relayed auth data");
        Ok(())
    }

    /// Read back the last relayed session, if all three keys are present.
    pub fn read_relayed(&self) -> StorageResult<Option<RelayedAuth>> {
        let token = match self.storage.get(&self.keys.auth_token())? {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(None),
        };
        let Some(user_raw) = self.storage.get(&self.keys.auth_user())? else {
            return Ok(None);
        };
        let Some(timestamp_raw) = self.storage.get(&self.keys.auth_timestamp())? else {
            return Ok(None);
        };

        let user = serde_json::from_str(&user_raw)
            .map_err(|e| StorageError::Encoding(format!("auth user: {}", e)))?;
        let timestamp = timestamp_raw
            .parse::<i64>()
            .map_err(|e| StorageError::Encoding(format!("auth timestamp: {}", e)))?;

        Ok(Some(RelayedAuth {
            token,
            user,
            timestamp,
        }))
    }

    /// Remove the relayed session keys.
    pub fn clear_relayed(&self) -> StorageResult<()> {
        self.storage.delete(&self.keys.auth_token())?;
        self.storage.delete(&self.keys.auth_user())?;
        self.storage.delete(&self.keys.auth_timestamp())?;
        Ok(())
    }

    // ==========================================
    // Manual Auth Record
    // ==========================================

    /// Stage a Manual Auth Record for the relay to pick up.
    pub fn stage_manual_record(&self, token: &str, user: &Value) -> StorageResult<()> {
        let user_json =
            serde_json::to_string(user).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(&self.keys.manual_token(), token)?;
        self.storage.set(&self.keys.manual_user(), &user_json)?;
        Ok(())
    }

    /// Read the staged Manual Auth Record.
    ///
    /// Returns `Ok(None)` unless both fields are present and non-empty.
    /// A user field that is not valid JSON is an `Encoding` error and the
    /// record stays in storage.
    pub fn read_manual_record(&self) -> StorageResult<Option<ManualRecord>> {
        let token = match self.storage.get(&self.keys.manual_token())? {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(None),
        };
        let user_raw = match self.storage.get(&self.keys.manual_user())? {
            Some(u) if !u.is_empty() => u,
            _ => return Ok(None),
        };

        let user = serde_json::from_str(&user_raw)
            .map_err(|e| StorageError::Encoding(format!("manual user: {}", e)))?;

        Ok(Some(ManualRecord { token, user }))
    }

    /// Delete both Manual Auth Record keys.
    ///
    /// Both deletes are attempted; the first failure is returned.
    pub fn clear_manual_record(&self) -> StorageResult<()> {
        let token = self.storage.delete(&self.keys.manual_token());
        let user = self.storage.delete(&self.keys.manual_user());
        token?;
        user?;
        Ok(())
    }
}
