//! Installed-set replacement
//!
//! The engine never edits installed rules incrementally. Each rebuild reads
//! one snapshot, compiles the complete set, and replaces everything the sink
//! currently holds in a single operation; an incremental diff would open a
//! window where stale block rules and fresh allow rules coexist. When two
//! rebuilds race, the sink's last-write-wins semantics decide, and either
//! result is a complete, correct set for some valid snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use guard_core::storage::{keys, StorageBackend, StorageError, StorageMap};
use guard_core::types::CompiledRule;

use crate::compile::{compile, CompileError};
use crate::lists::{strip_expired, ListSnapshot, TemporaryAllowEntry};

// =============================================================================
// Sink Trait
// =============================================================================

#[derive(Debug, Error)]
#[error("rule sink write failed: {0}")]
pub struct SinkError(pub String);

/// The external matching/enforcement collaborator.
#[async_trait]
pub trait RuleSink: Send + Sync {
    /// The currently installed rule set.
    async fn installed_rules(&self) -> Result<Vec<CompiledRule>, SinkError>;

    /// Atomically remove `remove_ids` and add `add_rules`. The engine always
    /// passes the complete installed id set as `remove_ids`.
    async fn replace_rules(
        &self,
        remove_ids: Vec<u32>,
        add_rules: Vec<CompiledRule>,
    ) -> Result<(), SinkError>;
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Counts from one rebuild, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    pub removed: usize,
    pub installed: usize,
}

pub struct Engine<S, K> {
    store: Arc<S>,
    sink: Arc<K>,
}

impl<S: StorageBackend, K: RuleSink> Engine<S, K> {
    pub fn new(store: Arc<S>, sink: Arc<K>) -> Self {
        Self { store, sink }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<K> {
        &self.sink
    }

    /// Read a snapshot, compile, and install the result as a full
    /// replacement. Storage, compile, and sink errors all propagate; a
    /// failed sink write must never be reported as success.
    pub async fn rebuild(&self, now_ms: i64) -> Result<RebuildSummary, EngineError> {
        let snapshot = ListSnapshot::read(self.store.as_ref()).await?;
        let rule_set = compile(&snapshot, now_ms)?;

        let remove_ids: Vec<u32> = self
            .sink
            .installed_rules()
            .await?
            .iter()
            .map(|r| r.id)
            .collect();
        let summary = RebuildSummary {
            removed: remove_ids.len(),
            installed: rule_set.len(),
        };
        self.sink.replace_rules(remove_ids, rule_set.rules).await?;

        // Best-effort: strip expired grants from storage after the set is
        // installed. A failed write here costs nothing but a later retry.
        if let Err(err) = self.prune_expired(&snapshot, now_ms).await {
            log::warn!("temporary-allow cleanup failed: {err}");
        }

        log::info!(
            "installed {} rules (removed {})",
            summary.installed,
            summary.removed
        );
        Ok(summary)
    }

    async fn prune_expired(
        &self,
        snapshot: &ListSnapshot,
        now_ms: i64,
    ) -> Result<(), StorageError> {
        let mut entries = StorageMap::new();
        if let Some(kept) = strip_expired(&snapshot.temp_allow_domains, now_ms) {
            entries.insert(keys::TEMP_ALLOW_DOMAINS.to_string(), temp_value(&kept)?);
        }
        if let Some(kept) = strip_expired(&snapshot.temp_allow_urls, now_ms) {
            entries.insert(keys::TEMP_ALLOW_URLS.to_string(), temp_value(&kept)?);
        }
        if entries.is_empty() {
            return Ok(());
        }
        self.store.set(entries).await
    }
}

fn temp_value(entries: &[TemporaryAllowEntry]) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(entries).map_err(|e| StorageError::Write(e.to_string()))
}

// =============================================================================
// In-memory Sink
// =============================================================================

/// Rule sink holding the installed set in memory, with the same
/// last-write-wins replace semantics as a real enforcement layer.
#[derive(Default)]
pub struct MemorySink {
    rules: Mutex<Vec<CompiledRule>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The installed set, for evaluation.
    pub async fn snapshot(&self) -> Vec<CompiledRule> {
        self.rules.lock().await.clone()
    }
}

#[async_trait]
impl RuleSink for MemorySink {
    async fn installed_rules(&self) -> Result<Vec<CompiledRule>, SinkError> {
        Ok(self.rules.lock().await.clone())
    }

    async fn replace_rules(
        &self,
        remove_ids: Vec<u32>,
        add_rules: Vec<CompiledRule>,
    ) -> Result<(), SinkError> {
        let mut rules = self.rules.lock().await;
        let remove: HashSet<u32> = remove_ids.into_iter().collect();
        rules.retain(|r| !remove.contains(&r.id));
        rules.extend(add_rules);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::storage::MemoryStore;
    use serde_json::json;

    use crate::lists::{quick_add, set_enabled, temp_allow_domain};

    struct FailingSink;

    #[async_trait]
    impl RuleSink for FailingSink {
        async fn installed_rules(&self) -> Result<Vec<CompiledRule>, SinkError> {
            Ok(Vec::new())
        }

        async fn replace_rules(
            &self,
            _remove_ids: Vec<u32>,
            _add_rules: Vec<CompiledRule>,
        ) -> Result<(), SinkError> {
            Err(SinkError("matcher unavailable".to_string()))
        }
    }

    fn engine(store: Arc<MemoryStore>, sink: Arc<MemorySink>) -> Engine<MemoryStore, MemorySink> {
        Engine::new(store, sink)
    }

    #[tokio::test]
    async fn rebuild_installs_the_compiled_set() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        quick_add(store.as_ref(), "shop.test").await.unwrap();

        let summary = engine(store, sink.clone()).rebuild(0).await.unwrap();
        assert_eq!(summary.removed, 0);
        assert_eq!(summary.installed, 2);
        assert_eq!(sink.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn rebuild_replaces_the_previous_set_wholesale() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = engine(store.clone(), sink.clone());

        quick_add(store.as_ref(), "shop.test").await.unwrap();
        engine.rebuild(0).await.unwrap();

        quick_add(store.as_ref(), "other.test").await.unwrap();
        let summary = engine.rebuild(0).await.unwrap();
        assert_eq!(summary.removed, 2);
        assert_eq!(summary.installed, 4);
        assert_eq!(sink.snapshot().await.len(), 4);
    }

    #[tokio::test]
    async fn disabling_removes_every_installed_rule() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = engine(store.clone(), sink.clone());

        quick_add(store.as_ref(), "shop.test").await.unwrap();
        engine.rebuild(0).await.unwrap();
        assert!(!sink.snapshot().await.is_empty());

        set_enabled(store.as_ref(), false).await.unwrap();
        let summary = engine.rebuild(0).await.unwrap();
        assert_eq!(summary.installed, 0);
        assert!(sink.snapshot().await.is_empty());

        // Repeating while disabled converges on the same empty set
        let summary = engine.rebuild(0).await.unwrap();
        assert_eq!(summary.removed, 0);
        assert_eq!(summary.installed, 0);
    }

    #[tokio::test]
    async fn sink_failure_propagates_to_the_caller() {
        let store = Arc::new(MemoryStore::new());
        quick_add(store.as_ref(), "shop.test").await.unwrap();

        let engine = Engine::new(store, Arc::new(FailingSink));
        assert!(matches!(
            engine.rebuild(0).await,
            Err(EngineError::Sink(_))
        ));
    }

    #[tokio::test]
    async fn rebuild_prunes_expired_grants_from_storage() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = engine(store.clone(), sink);

        temp_allow_domain(store.as_ref(), "old.test", 1, 0).await.unwrap();
        temp_allow_domain(store.as_ref(), "live.test", 1, 1_000_000).await.unwrap();

        // old.test expired 1 minute after epoch; live.test is still active
        engine.rebuild(1_000_000).await.unwrap();

        let snapshot = ListSnapshot::read(store.as_ref()).await.unwrap();
        assert_eq!(snapshot.temp_allow_domains.len(), 1);
        assert_eq!(snapshot.temp_allow_domains[0].subject, "live.test");
    }

    #[tokio::test]
    async fn rebuild_does_not_rewrite_unexpired_collections() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let engine = engine(store.clone(), sink);

        temp_allow_domain(store.as_ref(), "live.test", 10, 0).await.unwrap();

        let mut rx = store.subscribe();
        engine.rebuild(0).await.unwrap();
        // Nothing expired, so the rebuild issued no cleanup write
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_storage_keys_compile_as_empty() {
        let store = Arc::new(MemoryStore::new());
        // A foreign writer left a malformed value behind
        let mut entries = StorageMap::new();
        entries.insert(keys::BLOCKED_DOMAINS.to_string(), json!(42));
        store.set(entries).await.unwrap();

        let sink = Arc::new(MemorySink::new());
        let summary = engine(store, sink).rebuild(0).await.unwrap();
        assert_eq!(summary.installed, 0);
    }
}
