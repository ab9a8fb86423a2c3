//! Policy list snapshots and mutations
//!
//! The list store is owned by the persistence layer; this module reads one
//! consistent snapshot of it for compilation and provides the mutation
//! helpers the UI surfaces go through. Unset or malformed values always
//! degrade to empty collections.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use guard_core::normalize::{
    is_keyword_allowed, is_likely_domain, normalize_domain, normalize_keyword,
};
use guard_core::storage::{self, keys, StorageBackend, StorageError, StorageMap};

// =============================================================================
// Temporary Allows
// =============================================================================

/// A time-boxed allow grant for a domain or an exact URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryAllowEntry {
    pub subject: String,
    pub expires_at_epoch_millis: i64,
}

impl TemporaryAllowEntry {
    pub fn new(subject: impl Into<String>, expires_at_epoch_millis: i64) -> Self {
        Self {
            subject: subject.into(),
            expires_at_epoch_millis,
        }
    }

    /// Entries at or past their expiry are inert: excluded from compilation
    /// and eventually purged.
    pub fn is_active(&self, now_ms: i64) -> bool {
        self.expires_at_epoch_millis > now_ms
    }
}

/// Drop expired entries. Returns `None` when nothing was stripped, so
/// callers can skip the write entirely.
pub(crate) fn strip_expired(
    entries: &[TemporaryAllowEntry],
    now_ms: i64,
) -> Option<Vec<TemporaryAllowEntry>> {
    if entries.iter().all(|e| e.is_active(now_ms)) {
        return None;
    }
    Some(
        entries
            .iter()
            .filter(|e| e.is_active(now_ms))
            .cloned()
            .collect(),
    )
}

// =============================================================================
// Snapshot
// =============================================================================

/// One consistent read of everything rule compilation consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSnapshot {
    pub enabled: bool,
    pub blocked_domains: Vec<String>,
    pub blocked_subdomains: Vec<String>,
    pub blocked_keywords: Vec<String>,
    pub allow_domains: Vec<String>,
    pub allow_subdomains: Vec<String>,
    pub temp_allow_domains: Vec<TemporaryAllowEntry>,
    pub temp_allow_urls: Vec<TemporaryAllowEntry>,
}

impl Default for ListSnapshot {
    fn default() -> Self {
        Self {
            // Unset means on; only an explicit false disables protection.
            enabled: true,
            blocked_domains: Vec::new(),
            blocked_subdomains: Vec::new(),
            blocked_keywords: Vec::new(),
            allow_domains: Vec::new(),
            allow_subdomains: Vec::new(),
            temp_allow_domains: Vec::new(),
            temp_allow_urls: Vec::new(),
        }
    }
}

impl ListSnapshot {
    /// Read one snapshot from the store.
    pub async fn read(store: &dyn StorageBackend) -> Result<Self, StorageError> {
        let map = store
            .get(&[
                keys::ENABLED,
                keys::BLOCKED_DOMAINS,
                keys::BLOCKED_SUBDOMAINS,
                keys::BLOCKED_KEYWORDS,
                keys::ALLOW_DOMAINS,
                keys::ALLOW_SUBDOMAINS,
                keys::TEMP_ALLOW_DOMAINS,
                keys::TEMP_ALLOW_URLS,
            ])
            .await?;

        Ok(Self {
            enabled: storage::bool_flag(&map, keys::ENABLED, true),
            blocked_domains: storage::string_list(&map, keys::BLOCKED_DOMAINS),
            blocked_subdomains: storage::string_list(&map, keys::BLOCKED_SUBDOMAINS),
            blocked_keywords: storage::string_list(&map, keys::BLOCKED_KEYWORDS),
            allow_domains: storage::string_list(&map, keys::ALLOW_DOMAINS),
            allow_subdomains: storage::string_list(&map, keys::ALLOW_SUBDOMAINS),
            temp_allow_domains: temp_entries(&map, keys::TEMP_ALLOW_DOMAINS),
            temp_allow_urls: temp_entries(&map, keys::TEMP_ALLOW_URLS),
        })
    }
}

fn temp_entries(map: &StorageMap, key: &str) -> Vec<TemporaryAllowEntry> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn temp_value(entries: &[TemporaryAllowEntry]) -> Result<Value, StorageError> {
    serde_json::to_value(entries).map_err(|e| StorageError::Write(e.to_string()))
}

// =============================================================================
// Mutations
// =============================================================================

#[derive(Debug, Error)]
pub enum ListError {
    #[error("not a domain or a usable keyword: {0:?}")]
    InvalidInput(String),
    #[error("not a domain: {0:?}")]
    InvalidDomain(String),
    #[error("temporary allow urls must start with http:// or https://: {0:?}")]
    InvalidUrl(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What `quick_add` classified an input as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickAdd {
    Domain(String),
    Keyword(String),
}

/// Block lists the original onboarding recommends. Applied only when a
/// caller opts in.
pub const RECOMMENDED_BLOCKED_DOMAINS: &[&str] = &[
    "xvideos.com",
    "spankbang.com",
    "onlyfans.com",
    "pornhub.com",
    "xhamster.com",
    "redtube.com",
    "youporn.com",
];

pub const RECOMMENDED_BLOCKED_KEYWORDS: &[&str] = &[
    "porn",
    "xxx",
    "gore",
    "violence",
    "onlyfans",
    "spankbang",
    "xvideos",
    "pornhub",
    "xhamster",
    "redtube",
    "youporn",
];

/// Classify free-form input the way the quick-add box does: a domain lands
/// on both the exact-domain and subdomain block lists, anything else usable
/// becomes a keyword, and the rest is rejected without touching the store.
pub async fn quick_add(store: &dyn StorageBackend, raw: &str) -> Result<QuickAdd, ListError> {
    let domain = normalize_domain(raw);
    if is_likely_domain(&domain) {
        let map = store
            .get(&[keys::BLOCKED_DOMAINS, keys::BLOCKED_SUBDOMAINS])
            .await?;
        let mut domains = storage::string_list(&map, keys::BLOCKED_DOMAINS);
        let mut subdomains = storage::string_list(&map, keys::BLOCKED_SUBDOMAINS);
        if !domains.contains(&domain) {
            domains.insert(0, domain.clone());
        }
        if !subdomains.contains(&domain) {
            subdomains.insert(0, domain.clone());
        }
        let mut entries = StorageMap::new();
        entries.insert(keys::BLOCKED_DOMAINS.to_string(), json!(domains));
        entries.insert(keys::BLOCKED_SUBDOMAINS.to_string(), json!(subdomains));
        store.set(entries).await?;
        return Ok(QuickAdd::Domain(domain));
    }

    let keyword = normalize_keyword(raw);
    if is_keyword_allowed(&keyword) {
        let map = store.get(&[keys::BLOCKED_KEYWORDS]).await?;
        let mut keywords = storage::string_list(&map, keys::BLOCKED_KEYWORDS);
        if !keywords.contains(&keyword) {
            keywords.insert(0, keyword.clone());
        }
        let mut entries = StorageMap::new();
        entries.insert(keys::BLOCKED_KEYWORDS.to_string(), json!(keywords));
        store.set(entries).await?;
        return Ok(QuickAdd::Keyword(keyword));
    }

    Err(ListError::InvalidInput(raw.to_string()))
}

/// Remove a blocked domain; the matching subdomain entry goes with it.
pub async fn remove_blocked_domain(store: &dyn StorageBackend, raw: &str) -> Result<(), ListError> {
    let domain = normalize_domain(raw);
    let map = store
        .get(&[keys::BLOCKED_DOMAINS, keys::BLOCKED_SUBDOMAINS])
        .await?;
    let domains: Vec<String> = storage::string_list(&map, keys::BLOCKED_DOMAINS)
        .into_iter()
        .filter(|d| normalize_domain(d) != domain)
        .collect();
    let subdomains: Vec<String> = storage::string_list(&map, keys::BLOCKED_SUBDOMAINS)
        .into_iter()
        .filter(|d| normalize_domain(d) != domain)
        .collect();
    let mut entries = StorageMap::new();
    entries.insert(keys::BLOCKED_DOMAINS.to_string(), json!(domains));
    entries.insert(keys::BLOCKED_SUBDOMAINS.to_string(), json!(subdomains));
    store.set(entries).await?;
    Ok(())
}

pub async fn remove_blocked_keyword(store: &dyn StorageBackend, raw: &str) -> Result<(), ListError> {
    let keyword = normalize_keyword(raw);
    let map = store.get(&[keys::BLOCKED_KEYWORDS]).await?;
    let keywords: Vec<String> = storage::string_list(&map, keys::BLOCKED_KEYWORDS)
        .into_iter()
        .filter(|k| normalize_keyword(k) != keyword)
        .collect();
    let mut entries = StorageMap::new();
    entries.insert(keys::BLOCKED_KEYWORDS.to_string(), json!(keywords));
    store.set(entries).await?;
    Ok(())
}

/// Add a standing allow for a domain, optionally covering its subdomains.
pub async fn add_allow_domain(
    store: &dyn StorageBackend,
    raw: &str,
    include_subdomains: bool,
) -> Result<String, ListError> {
    let domain = normalize_domain(raw);
    if !is_likely_domain(&domain) {
        return Err(ListError::InvalidDomain(raw.to_string()));
    }
    let map = store
        .get(&[keys::ALLOW_DOMAINS, keys::ALLOW_SUBDOMAINS])
        .await?;
    let mut domains = storage::string_list(&map, keys::ALLOW_DOMAINS);
    if !domains.contains(&domain) {
        domains.insert(0, domain.clone());
    }
    let mut entries = StorageMap::new();
    entries.insert(keys::ALLOW_DOMAINS.to_string(), json!(domains));
    if include_subdomains {
        let mut subdomains = storage::string_list(&map, keys::ALLOW_SUBDOMAINS);
        if !subdomains.contains(&domain) {
            subdomains.insert(0, domain.clone());
        }
        entries.insert(keys::ALLOW_SUBDOMAINS.to_string(), json!(subdomains));
    }
    store.set(entries).await?;
    Ok(domain)
}

/// Time-boxed allow for a whole domain.
pub async fn temp_allow_domain(
    store: &dyn StorageBackend,
    raw: &str,
    minutes: i64,
    now_ms: i64,
) -> Result<TemporaryAllowEntry, ListError> {
    let domain = normalize_domain(raw);
    if !is_likely_domain(&domain) {
        return Err(ListError::InvalidDomain(raw.to_string()));
    }
    let entry = TemporaryAllowEntry::new(domain, now_ms + minutes * 60_000);
    upsert_temp(store, keys::TEMP_ALLOW_DOMAINS, entry.clone()).await?;
    Ok(entry)
}

/// Time-boxed allow for one exact URL.
pub async fn temp_allow_url(
    store: &dyn StorageBackend,
    raw: &str,
    minutes: i64,
    now_ms: i64,
) -> Result<TemporaryAllowEntry, ListError> {
    let url = raw.trim().to_string();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ListError::InvalidUrl(raw.to_string()));
    }
    let entry = TemporaryAllowEntry::new(url, now_ms + minutes * 60_000);
    upsert_temp(store, keys::TEMP_ALLOW_URLS, entry.clone()).await?;
    Ok(entry)
}

async fn upsert_temp(
    store: &dyn StorageBackend,
    key: &str,
    entry: TemporaryAllowEntry,
) -> Result<(), ListError> {
    let map = store.get(&[key]).await?;
    let mut all = temp_entries(&map, key);
    all.retain(|e| e.subject != entry.subject);
    all.push(entry);
    let mut entries = StorageMap::new();
    entries.insert(key.to_string(), temp_value(&all)?);
    store.set(entries).await?;
    Ok(())
}

pub async fn set_enabled(store: &dyn StorageBackend, enabled: bool) -> Result<(), StorageError> {
    let mut entries = StorageMap::new();
    entries.insert(keys::ENABLED.to_string(), json!(enabled));
    store.set(entries).await
}
