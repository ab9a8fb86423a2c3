//! Credential verification and recovery material
//!
//! Verification tries channels in a fixed order: password, then single-use
//! recovery codes, then the recovery phrase. A matched code is removed from
//! the store before success is reported; the phrase is never consumed.

use rand::Rng;
use serde_json::Value;

use guard_core::storage::{self, keys, StorageBackend, StorageError, StorageMap};

use crate::secret::{derive_password_secret, digests_match, sha256_hex};
use crate::wordlist::WORDLIST;
use crate::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const RECOVERY_CODE_COUNT: usize = 10;
pub const RECOVERY_PHRASE_WORDS: usize = 12;

/// Channel a candidate was accepted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMethod {
    Password,
    RecoveryCode,
    RecoveryPhrase,
}

/// Outcome of [`verify_credential`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Accepted {
        method: VerifyMethod,
        /// Position of the consumed recovery code, when that channel matched.
        consumed_code_index: Option<usize>,
    },
    Rejected,
}

impl Verification {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verification::Accepted { .. })
    }
}

/// Whether a password has been configured at all.
pub async fn has_password(store: &dyn StorageBackend) -> Result<bool, StorageError> {
    let map = store.get(&[keys::PW_HASH]).await?;
    Ok(map
        .get(keys::PW_HASH)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty()))
}

/// Set or change the password. An already-stored salt is reused; only the
/// digest changes.
pub async fn set_password(store: &dyn StorageBackend, password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    let map = store.get(&[keys::PW_SALT]).await?;
    let existing_salt = map
        .get(keys::PW_SALT)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);

    let secret = derive_password_secret(password, existing_salt.as_deref())?;

    let mut entries = StorageMap::new();
    entries.insert(keys::PW_SALT.to_string(), Value::from(secret.salt_b64));
    entries.insert(keys::PW_HASH.to_string(), Value::from(secret.hash_hex));
    store.set(entries).await?;
    Ok(())
}

/// Verify a password, recovery code, or recovery phrase.
pub async fn verify_credential(
    store: &dyn StorageBackend,
    candidate: &str,
) -> Result<Verification, AuthError> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Ok(Verification::Rejected);
    }

    let map = store
        .get(&[
            keys::PW_SALT,
            keys::PW_HASH,
            keys::RECOVERY_CODE_HASHES,
            keys::RECOVERY_PHRASE_HASH,
        ])
        .await?;

    // Password: re-derive with the stored salt, compare in constant time.
    let stored_salt = map.get(keys::PW_SALT).and_then(Value::as_str);
    let stored_hash = map.get(keys::PW_HASH).and_then(Value::as_str);
    if let (Some(salt), Some(stored)) = (stored_salt, stored_hash) {
        match derive_password_secret(candidate, Some(salt)) {
            Ok(secret) => {
                if digests_match(&secret.hash_hex, stored) {
                    return Ok(Verification::Accepted {
                        method: VerifyMethod::Password,
                        consumed_code_index: None,
                    });
                }
            }
            // A corrupt salt disables the password channel; recovery
            // channels still work.
            Err(err) => log::warn!("password verification unavailable: {err}"),
        }
    }

    let candidate_hash = sha256_hex(candidate);

    // Recovery code: exact hash match, consumed before success is reported.
    let codes = storage::string_list(&map, keys::RECOVERY_CODE_HASHES);
    if let Some(index) = codes.iter().position(|h| h == &candidate_hash) {
        let mut remaining = codes;
        remaining.remove(index);
        let mut entries = StorageMap::new();
        entries.insert(
            keys::RECOVERY_CODE_HASHES.to_string(),
            Value::from(remaining),
        );
        store.set(entries).await?;
        return Ok(Verification::Accepted {
            method: VerifyMethod::RecoveryCode,
            consumed_code_index: Some(index),
        });
    }

    // Recovery phrase: never consumed.
    if let Some(phrase_hash) = map.get(keys::RECOVERY_PHRASE_HASH).and_then(Value::as_str) {
        if !phrase_hash.is_empty() && phrase_hash == candidate_hash {
            return Ok(Verification::Accepted {
                method: VerifyMethod::RecoveryPhrase,
                consumed_code_index: None,
            });
        }
    }

    Ok(Verification::Rejected)
}

// =============================================================================
// Recovery Kit
// =============================================================================

/// Plaintext recovery material, returned exactly once at generation time.
#[derive(Debug, Clone)]
pub struct RecoveryKit {
    pub codes: Vec<String>,
    pub phrase: String,
}

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate and store fresh recovery material, replacing any previous kit.
/// Only the hashes are persisted.
pub async fn generate_recovery_kit(store: &dyn StorageBackend) -> Result<RecoveryKit, AuthError> {
    let mut rng = rand::thread_rng();

    let codes: Vec<String> = (0..RECOVERY_CODE_COUNT)
        .map(|_| recovery_code(&mut rng))
        .collect();
    let phrase = (0..RECOVERY_PHRASE_WORDS)
        .map(|_| WORDLIST[rng.gen_range(0..WORDLIST.len())])
        .collect::<Vec<_>>()
        .join(" ");

    let code_hashes: Vec<String> = codes.iter().map(|c| sha256_hex(c)).collect();

    let mut entries = StorageMap::new();
    entries.insert(
        keys::RECOVERY_CODE_HASHES.to_string(),
        Value::from(code_hashes),
    );
    entries.insert(
        keys::RECOVERY_PHRASE_HASH.to_string(),
        Value::from(sha256_hex(&phrase)),
    );
    store.set(entries).await?;

    Ok(RecoveryKit { codes, phrase })
}

fn recovery_code(rng: &mut impl Rng) -> String {
    let mut group = || {
        (0..4)
            .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
            .collect::<String>()
    };
    format!("{}-{}-{}", group(), group(), group())
}
