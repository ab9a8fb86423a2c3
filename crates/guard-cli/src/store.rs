//! File-backed persistence and rule sink
//!
//! The store is one JSON object on disk: reads load the whole object, writes
//! merge into it, persist, then notify subscribers. The installed rule set
//! lives in a second file with the same full-replacement semantics a real
//! enforcement layer would apply.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use guard_compiler::{RuleSink, SinkError};
use guard_core::storage::{
    ChangeNotification, StorageBackend, StorageError, StorageMap,
};
use guard_core::types::CompiledRule;

// =============================================================================
// JSON Store
// =============================================================================

pub struct JsonFileStore {
    path: PathBuf,
    notify: broadcast::Sender<ChangeNotification>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (notify, _) = broadcast::channel(64);
        Self {
            path: path.into(),
            notify,
        }
    }

    /// A missing file is an empty store; a corrupt one is a read failure.
    async fn load(&self) -> Result<serde_json::Map<String, Value>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                let value: Value = serde_json::from_str(&text)
                    .map_err(|e| StorageError::Read(format!("{}: {e}", self.path.display())))?;
                match value {
                    Value::Object(map) => Ok(map),
                    _ => Err(StorageError::Read(format!(
                        "{}: not a JSON object",
                        self.path.display()
                    ))),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(serde_json::Map::new()),
            Err(e) => Err(StorageError::Read(e.to_string())),
        }
    }

    async fn persist(&self, map: &serde_json::Map<String, Value>) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(map)
            .map_err(|e| StorageError::Write(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::Write(e.to_string()))?;
            }
        }
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| StorageError::Write(e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StorageError> {
        let map = self.load().await?;
        let mut out = StorageMap::new();
        for &key in keys {
            if let Some(value) = map.get(key) {
                out.insert(key.to_string(), value.clone());
            }
        }
        Ok(out)
    }

    async fn set(&self, entries: StorageMap) -> Result<(), StorageError> {
        let mut map = self.load().await?;
        let changed_keys: Vec<String> = entries.keys().cloned().collect();
        for (key, value) in entries {
            map.insert(key, value);
        }
        self.persist(&map).await?;
        let _ = self.notify.send(ChangeNotification { changed_keys });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notify.subscribe()
    }
}

// =============================================================================
// JSON Rule Sink
// =============================================================================

/// Installed rule set persisted as a JSON array next to the store.
pub struct JsonRuleSink {
    path: PathBuf,
}

impl JsonRuleSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<CompiledRule>, SinkError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| SinkError(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(SinkError(e.to_string())),
        }
    }

    async fn persist(&self, rules: &[CompiledRule]) -> Result<(), SinkError> {
        let text = serde_json::to_string_pretty(rules).map_err(|e| SinkError(e.to_string()))?;
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| SinkError(e.to_string()))
    }
}

#[async_trait]
impl RuleSink for JsonRuleSink {
    async fn installed_rules(&self) -> Result<Vec<CompiledRule>, SinkError> {
        self.load().await
    }

    async fn replace_rules(
        &self,
        remove_ids: Vec<u32>,
        add_rules: Vec<CompiledRule>,
    ) -> Result<(), SinkError> {
        let mut rules = self.load().await?;
        let remove: HashSet<u32> = remove_ids.into_iter().collect();
        rules.retain(|r| !remove.contains(&r.id));
        rules.extend(add_rules);
        self.persist(&rules).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::storage::keys;
    use guard_core::types::{RuleAction, UrlMatcher};
    use serde_json::json;

    #[tokio::test]
    async fn a_missing_store_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("guardian.json"));
        let map = store.get(&[keys::ENABLED]).await.unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn writes_merge_persist_and_notify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.json");

        let store = JsonFileStore::new(&path);
        let mut rx = store.subscribe();

        let mut entries = StorageMap::new();
        entries.insert(keys::ENABLED.to_string(), json!(true));
        store.set(entries).await.unwrap();

        let mut entries = StorageMap::new();
        entries.insert(keys::BLOCKED_DOMAINS.to_string(), json!(["shop.test"]));
        store.set(entries).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap().changed_keys,
            vec![keys::ENABLED.to_string()]
        );

        // A second store over the same file sees both writes
        let reopened = JsonFileStore::new(&path);
        let map = reopened
            .get(&[keys::ENABLED, keys::BLOCKED_DOMAINS])
            .await
            .unwrap();
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn a_corrupt_store_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.get(&[keys::ENABLED]).await,
            Err(StorageError::Read(_))
        ));
    }

    #[tokio::test]
    async fn the_sink_applies_full_replacement_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonRuleSink::new(dir.path().join("rules.json"));
        assert!(sink.installed_rules().await.unwrap().is_empty());

        let first = CompiledRule {
            id: 100_001,
            priority: 1,
            action: RuleAction::Block,
            matcher: UrlMatcher::ExactDomain("shop.test".to_string()),
        };
        sink.replace_rules(Vec::new(), vec![first.clone()])
            .await
            .unwrap();
        assert_eq!(sink.installed_rules().await.unwrap(), vec![first.clone()]);

        let second = CompiledRule {
            id: 900_001,
            priority: 10,
            action: RuleAction::Allow,
            matcher: UrlMatcher::ExactDomain("ok.test".to_string()),
        };
        sink.replace_rules(vec![first.id], vec![second.clone()])
            .await
            .unwrap();
        assert_eq!(sink.installed_rules().await.unwrap(), vec![second]);
    }
}
