//! Persistence collaborator
//!
//! Guardian owns no storage itself. Lists and credentials live in an
//! external key-value store that reports every write back through a change
//! stream; the engine reads full snapshots and writes whole values, never
//! read-modify-writing a subset under weaker assumptions.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

// =============================================================================
// Keys
// =============================================================================

/// Canonical storage key names. These are wire names shared with every other
/// consumer of the store; do not rename.
pub mod keys {
    pub const ENABLED: &str = "enabled";
    pub const SETUP_COMPLETE: &str = "setupComplete";
    pub const LOCK_ENABLED: &str = "lockEnabled";

    pub const BLOCKED_DOMAINS: &str = "blockedDomains";
    pub const BLOCKED_SUBDOMAINS: &str = "blockedSubdomains";
    pub const BLOCKED_KEYWORDS: &str = "blockedKeywords";
    pub const ALLOW_DOMAINS: &str = "allowDomains";
    pub const ALLOW_SUBDOMAINS: &str = "allowSubdomains";
    pub const TEMP_ALLOW_DOMAINS: &str = "tempAllowDomains";
    pub const TEMP_ALLOW_URLS: &str = "tempAllowUrls";

    pub const BLOCK_LOG: &str = "blockLog";
    pub const BLOCKED_COUNT: &str = "blockedCount";

    pub const PW_SALT: &str = "pwSaltB64";
    pub const PW_HASH: &str = "pwHashHex";
    pub const RECOVERY_CODE_HASHES: &str = "recoveryCodeHashes";
    pub const RECOVERY_PHRASE_HASH: &str = "recoveryPhraseHash";

    pub const PRO_LICENSE: &str = "guardianProLicense";
}

// =============================================================================
// Backend Trait
// =============================================================================

pub type StorageMap = HashMap<String, Value>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage read failed: {0}")]
    Read(String),
    #[error("storage write failed: {0}")]
    Write(String),
}

/// Delivered for every write to the store, including writes by other
/// instances sharing it.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub changed_keys: Vec<String>,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch the requested keys. Missing keys are simply absent from the
    /// returned map; callers treat them as empty collections.
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StorageError>;

    /// Write the given entries. Implementations notify subscribers of the
    /// changed keys once the write has landed.
    async fn set(&self, entries: StorageMap) -> Result<(), StorageError>;

    /// Subscribe to the change stream.
    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification>;
}

// =============================================================================
// Value Coercion
// =============================================================================

// Storage values are written by several surfaces; malformed shapes degrade
// to empty rather than failing a read.

/// A list of strings under `key`; non-arrays and non-string elements
/// degrade to nothing.
pub fn string_list(map: &StorageMap, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

/// A boolean flag under `key`, with a default for the unset case.
pub fn bool_flag(map: &StorageMap, key: &str, default: bool) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(default)
}

// =============================================================================
// In-memory Backend
// =============================================================================

/// In-process storage backend. Used by tests and by embedders that persist
/// elsewhere.
pub struct MemoryStore {
    data: Mutex<StorageMap>,
    notify: broadcast::Sender<ChangeNotification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(64);
        Self {
            data: Mutex::new(HashMap::new()),
            notify,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StorageError> {
        let data = self.data.lock().await;
        let mut out = StorageMap::new();
        for &key in keys {
            if let Some(value) = data.get(key) {
                out.insert(key.to_string(), value.clone());
            }
        }
        Ok(out)
    }

    async fn set(&self, entries: StorageMap) -> Result<(), StorageError> {
        let changed_keys: Vec<String> = entries.keys().cloned().collect();
        {
            let mut data = self.data.lock().await;
            data.extend(entries);
        }
        // No subscribers is fine; the notification is simply dropped.
        let _ = self.notify.send(ChangeNotification { changed_keys });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notify.subscribe()
    }
}
