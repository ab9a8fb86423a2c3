//! Storage-change synchronization
//!
//! Every write to a policy-relevant key re-derives the installed rule set.
//! Notifications are consumed by a single loop in delivery order; each
//! rebuild reads its own full snapshot, so overlapping writes simply
//! converge on the last one.

use tokio::sync::broadcast;

use guard_core::storage::{keys, ChangeNotification, StorageBackend};

use crate::engine::{Engine, EngineError, RuleSink};

/// Keys whose writes require recompilation. Changes to any other key are
/// ignored by this subsystem.
pub const TRIGGER_KEYS: &[&str] = &[
    keys::ENABLED,
    keys::BLOCKED_DOMAINS,
    keys::BLOCKED_SUBDOMAINS,
    keys::BLOCKED_KEYWORDS,
    keys::ALLOW_DOMAINS,
    keys::ALLOW_SUBDOMAINS,
    keys::TEMP_ALLOW_DOMAINS,
    keys::TEMP_ALLOW_URLS,
];

pub fn is_trigger_change(changed_keys: &[String]) -> bool {
    changed_keys
        .iter()
        .any(|key| TRIGGER_KEYS.contains(&key.as_str()))
}

pub struct SyncTrigger<S, K> {
    engine: Engine<S, K>,
}

impl<S: StorageBackend, K: RuleSink> SyncTrigger<S, K> {
    pub fn new(engine: Engine<S, K>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine<S, K> {
        &self.engine
    }

    /// Rebuild if the change touches a trigger key. Returns whether a
    /// rebuild ran.
    pub async fn handle_change(
        &self,
        changed_keys: &[String],
        now_ms: i64,
    ) -> Result<bool, EngineError> {
        if !is_trigger_change(changed_keys) {
            return Ok(false);
        }
        self.engine.rebuild(now_ms).await?;
        Ok(true)
    }

    /// Consume the change stream until it closes. Rebuild failures are
    /// logged and the loop keeps going; a manual rebuild is the retry path.
    pub async fn run(&self, mut changes: broadcast::Receiver<ChangeNotification>) {
        loop {
            match changes.recv().await {
                Ok(notification) => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    if let Err(err) = self.handle_change(&notification.changed_keys, now_ms).await {
                        log::error!("rule rebuild failed: {err}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("change stream lagged, {missed} notifications dropped");
                    // Catch up with one rebuild; a pass always reads a full
                    // snapshot.
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    if let Err(err) = self.engine.rebuild(now_ms).await {
                        log::error!("rule rebuild failed: {err}");
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use guard_core::storage::{MemoryStore, StorageMap};

    use super::*;
    use crate::engine::MemorySink;
    use crate::lists::quick_add;

    fn trigger(
        store: Arc<MemoryStore>,
        sink: Arc<MemorySink>,
    ) -> SyncTrigger<MemoryStore, MemorySink> {
        SyncTrigger::new(Engine::new(store, sink))
    }

    #[test]
    fn only_policy_keys_are_triggers() {
        assert!(is_trigger_change(&["enabled".to_string()]));
        assert!(is_trigger_change(&[
            "blockLog".to_string(),
            "tempAllowUrls".to_string()
        ]));
        assert!(!is_trigger_change(&["blockLog".to_string()]));
        assert!(!is_trigger_change(&["pwHashHex".to_string()]));
        assert!(!is_trigger_change(&[]));
    }

    #[tokio::test]
    async fn handle_change_rebuilds_for_trigger_keys_only() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        quick_add(store.as_ref(), "shop.test").await.unwrap();

        let trigger = trigger(store, sink.clone());

        let ran = trigger
            .handle_change(&["blockLog".to_string()], 0)
            .await
            .unwrap();
        assert!(!ran);
        assert!(sink.snapshot().await.is_empty());

        let ran = trigger
            .handle_change(&["blockedDomains".to_string()], 0)
            .await
            .unwrap();
        assert!(ran);
        assert_eq!(sink.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn run_drains_queued_notifications_and_converges() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let changes = store.subscribe();

        // Two writes queue up before the loop starts draining.
        quick_add(store.as_ref(), "a.test").await.unwrap();
        quick_add(store.as_ref(), "b.test").await.unwrap();

        let trigger = Arc::new(trigger(store.clone(), sink.clone()));
        let worker = {
            let trigger = trigger.clone();
            tokio::spawn(async move { trigger.run(changes).await })
        };

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while sink.snapshot().await.len() != 4 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("sync loop should process queued notifications");

        worker.abort();
    }

    #[tokio::test]
    async fn non_trigger_writes_do_not_rebuild() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        quick_add(store.as_ref(), "shop.test").await.unwrap();

        let trigger = trigger(store.clone(), sink.clone());
        let mut entries = StorageMap::new();
        entries.insert(keys::BLOCKED_COUNT.to_string(), json!(3));
        store.set(entries).await.unwrap();

        let ran = trigger
            .handle_change(&[keys::BLOCKED_COUNT.to_string()], 0)
            .await
            .unwrap();
        assert!(!ran);
        assert!(sink.snapshot().await.is_empty());
    }
}
