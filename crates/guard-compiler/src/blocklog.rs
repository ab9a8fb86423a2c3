//! Block-event log
//!
//! Blocked navigations are recorded for the status surfaces: newest first,
//! capped, plus a running counter. Observability only; nothing here feeds
//! back into compilation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use guard_core::notice::BlockNotice;
use guard_core::storage::{keys, StorageBackend, StorageError, StorageMap};
use guard_core::types::BlockKind;

/// Oldest entries fall off past this many.
pub const BLOCK_LOG_CAP: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLogEntry {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(rename = "match")]
    pub matched: String,
    pub reason: String,
    pub at: String,
}

/// Prepend one block event and bump the counter.
pub async fn record_block(
    store: &dyn StorageBackend,
    notice: &BlockNotice,
    at: DateTime<Utc>,
) -> Result<(), StorageError> {
    let map = store.get(&[keys::BLOCK_LOG, keys::BLOCKED_COUNT]).await?;
    let mut log = read_entries(&map);
    let count = map
        .get(keys::BLOCKED_COUNT)
        .and_then(Value::as_u64)
        .unwrap_or(0);

    log.insert(
        0,
        BlockLogEntry {
            url: notice.url.clone(),
            kind: notice.kind,
            matched: notice.matched.clone(),
            reason: notice.reason(),
            at: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        },
    );
    log.truncate(BLOCK_LOG_CAP);

    let mut entries = StorageMap::new();
    entries.insert(
        keys::BLOCK_LOG.to_string(),
        serde_json::to_value(&log).map_err(|e| StorageError::Write(e.to_string()))?,
    );
    entries.insert(keys::BLOCKED_COUNT.to_string(), Value::from(count + 1));
    store.set(entries).await
}

/// The most recent `limit` events, newest first.
pub async fn read_log(
    store: &dyn StorageBackend,
    limit: usize,
) -> Result<Vec<BlockLogEntry>, StorageError> {
    let map = store.get(&[keys::BLOCK_LOG]).await?;
    let mut log = read_entries(&map);
    log.truncate(limit);
    Ok(log)
}

pub async fn blocked_count(store: &dyn StorageBackend) -> Result<u64, StorageError> {
    let map = store.get(&[keys::BLOCKED_COUNT]).await?;
    Ok(map
        .get(keys::BLOCKED_COUNT)
        .and_then(Value::as_u64)
        .unwrap_or(0))
}

pub async fn clear_log(store: &dyn StorageBackend) -> Result<(), StorageError> {
    let mut entries = StorageMap::new();
    entries.insert(keys::BLOCK_LOG.to_string(), Value::Array(Vec::new()));
    entries.insert(keys::BLOCKED_COUNT.to_string(), Value::from(0u64));
    store.set(entries).await
}

fn read_entries(map: &StorageMap) -> Vec<BlockLogEntry> {
    match map.get(keys::BLOCK_LOG) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use guard_core::storage::MemoryStore;

    fn notice(url: &str) -> BlockNotice {
        BlockNotice {
            kind: BlockKind::Domain,
            matched: "shop.test".to_string(),
            url: url.to_string(),
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    #[tokio::test]
    async fn events_are_prepended_and_counted() {
        let store = MemoryStore::new();
        record_block(&store, &notice("https://shop.test/a"), at(1)).await.unwrap();
        record_block(&store, &notice("https://shop.test/b"), at(2)).await.unwrap();

        let log = read_log(&store, 10).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].url, "https://shop.test/b");
        assert_eq!(log[0].reason, "Blocked domain: shop.test");
        assert_eq!(blocked_count(&store).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn the_log_is_capped() {
        let store = MemoryStore::new();
        for i in 0..(BLOCK_LOG_CAP + 5) {
            record_block(&store, &notice(&format!("https://shop.test/{i}")), at(i as i64))
                .await
                .unwrap();
        }
        let log = read_log(&store, usize::MAX).await.unwrap();
        assert_eq!(log.len(), BLOCK_LOG_CAP);
        // The counter keeps running past the cap
        assert_eq!(blocked_count(&store).await.unwrap(), (BLOCK_LOG_CAP + 5) as u64);
    }

    #[tokio::test]
    async fn clear_resets_log_and_counter() {
        let store = MemoryStore::new();
        record_block(&store, &notice("https://shop.test/a"), at(1)).await.unwrap();
        clear_log(&store).await.unwrap();
        assert!(read_log(&store, 10).await.unwrap().is_empty());
        assert_eq!(blocked_count(&store).await.unwrap(), 0);
    }
}
