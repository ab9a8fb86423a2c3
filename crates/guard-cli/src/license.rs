//! Local licensing and feature gating
//!
//! Pro features check a locally activated key; the rule engine itself is
//! never gated. Key format: `GPRO-XXXX-XXXX-XXXX` over `A-Z0-9`, where the
//! final character is a mod-36 checksum of the preceding eleven.

use rand::Rng;
use serde_json::Value;

use guard_core::storage::{keys, StorageBackend, StorageError, StorageMap};

/// Features that require an activated license.
pub const PRO_FEATURES: &[&str] = &[
    "dns_detection",
    "router_wizard",
    "network_alerts",
    "protection_score",
    "advanced_logs",
];

pub fn is_pro_feature(name: &str) -> bool {
    PRO_FEATURES.contains(&name)
}

/// Non-pro features are always available; pro features need a valid key.
pub async fn can_use_feature(
    store: &dyn StorageBackend,
    name: &str,
) -> Result<bool, StorageError> {
    if !is_pro_feature(name) {
        return Ok(true);
    }
    is_pro(store).await
}

pub async fn is_pro(store: &dyn StorageBackend) -> Result<bool, StorageError> {
    let map = store.get(&[keys::PRO_LICENSE]).await?;
    Ok(map
        .get(keys::PRO_LICENSE)
        .and_then(Value::as_str)
        .is_some_and(validate_local_key))
}

/// Store a key after validating it. Returns the normalized key.
pub async fn activate_local_key(
    store: &dyn StorageBackend,
    key: &str,
) -> Result<Option<String>, StorageError> {
    let normalized = key.trim().to_uppercase();
    if !validate_local_key(&normalized) {
        return Ok(None);
    }
    let mut entries = StorageMap::new();
    entries.insert(keys::PRO_LICENSE.to_string(), Value::from(normalized.clone()));
    store.set(entries).await?;
    Ok(Some(normalized))
}

/// Shape and checksum check; no network involved.
pub fn validate_local_key(key: &str) -> bool {
    let normalized = key.trim().to_uppercase();
    let Some(body) = normalized.strip_prefix("GPRO-") else {
        return false;
    };
    let groups: Vec<&str> = body.split('-').collect();
    if groups.len() != 3
        || groups
            .iter()
            .any(|g| g.len() != 4 || !g.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()))
    {
        return false;
    }
    let chars: Vec<char> = groups.concat().chars().collect();
    let sum: u32 = chars[..11].iter().map(|&c| c as u32).sum();
    chars[11] == checksum_char(sum)
}

pub fn generate_license_key(rng: &mut impl Rng) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut part = |len: usize| {
        (0..len)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect::<String>()
    };
    let p1 = part(4);
    let p2 = part(4);
    let head = part(3);
    let sum: u32 = p1.chars().chain(p2.chars()).chain(head.chars()).map(|c| c as u32).sum();
    format!("GPRO-{p1}-{p2}-{head}{}", checksum_char(sum))
}

fn checksum_char(sum: u32) -> char {
    let check = (sum % 36) as u8;
    if check < 10 {
        (b'0' + check) as char
    } else {
        (b'A' + check - 10) as char
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::storage::MemoryStore;

    #[test]
    fn generated_keys_validate() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let key = generate_license_key(&mut rng);
            assert!(validate_local_key(&key), "{key}");
        }
    }

    #[test]
    fn validation_is_case_insensitive_and_shape_strict() {
        let mut rng = rand::thread_rng();
        let key = generate_license_key(&mut rng);
        assert!(validate_local_key(&key.to_lowercase()));

        assert!(!validate_local_key("GPRO-ABCD-EFGH"));
        assert!(!validate_local_key("XPRO-ABCD-EFGH-IJKL"));
        assert!(!validate_local_key("GPRO-AB!D-EFGH-IJKL"));
        assert!(!validate_local_key(""));
    }

    #[test]
    fn tampering_breaks_the_checksum() {
        let mut rng = rand::thread_rng();
        let key = generate_license_key(&mut rng);
        let mut tampered: Vec<char> = key.chars().collect();
        // Flip the first body character to a different one
        tampered[5] = if tampered[5] == 'A' { 'B' } else { 'A' };
        let tampered: String = tampered.into_iter().collect();
        assert!(!validate_local_key(&tampered));
    }

    #[tokio::test]
    async fn feature_gate_only_guards_pro_features() {
        let store = MemoryStore::new();
        assert!(can_use_feature(&store, "core_rules").await.unwrap());
        assert!(!can_use_feature(&store, "dns_detection").await.unwrap());

        let mut rng = rand::thread_rng();
        let key = generate_license_key(&mut rng);
        let activated = activate_local_key(&store, &key).await.unwrap();
        assert_eq!(activated, Some(key));
        assert!(can_use_feature(&store, "dns_detection").await.unwrap());
    }

    #[tokio::test]
    async fn invalid_keys_do_not_activate() {
        let store = MemoryStore::new();
        let activated = activate_local_key(&store, "GPRO-0000-0000-0000").await.unwrap();
        assert_eq!(activated, None);
        assert!(!is_pro(&store).await.unwrap());
    }
}
