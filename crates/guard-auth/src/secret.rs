//! Digest primitives
//!
//! The password digest has to survive an offline attack on a leaked store,
//! so it runs a deliberately slow salted KDF. Recovery material is
//! high-entropy, so a single fast hash is enough there.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::AuthError;

/// PBKDF2-HMAC-SHA256 round count for the password digest.
pub const PBKDF2_ROUNDS: u32 = 150_000;

/// Fresh salts are this many random bytes.
pub const SALT_LEN: usize = 16;

/// A derived password secret: the salt that produced it and the hex digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordSecret {
    pub salt_b64: String,
    pub hash_hex: String,
}

/// Derive the password digest.
///
/// A supplied salt is reused so the result can be compared against a
/// previously stored digest; without one, a fresh random salt is generated.
pub fn derive_password_secret(
    password: &str,
    existing_salt_b64: Option<&str>,
) -> Result<PasswordSecret, AuthError> {
    let salt = match existing_salt_b64 {
        Some(encoded) => BASE64.decode(encoded).map_err(|_| AuthError::InvalidSalt)?,
        None => {
            let mut salt = vec![0u8; SALT_LEN];
            rand::thread_rng().fill_bytes(&mut salt);
            salt
        }
    };

    let mut digest = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ROUNDS, &mut digest);

    Ok(PasswordSecret {
        salt_b64: BASE64.encode(&salt),
        hash_hex: hex::encode(digest),
    })
}

/// SHA-256 of the input, hex-encoded. Used for recovery codes and phrases.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time equality over two hex digests. Length mismatch or bad hex
/// is a plain rejection.
pub fn digests_match(a_hex: &str, b_hex: &str) -> bool {
    let Ok(a) = hex::decode(a_hex) else {
        return false;
    };
    let Ok(b) = hex::decode(b_hex) else {
        return false;
    };
    a.len() == b.len() && bool::from(a.ct_eq(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_with_the_same_salt_is_deterministic() {
        let first = derive_password_secret("correct horse", None).unwrap();
        let second = derive_password_secret("correct horse", Some(&first.salt_b64)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fresh_salts_produce_different_digests() {
        let a = derive_password_secret("correct horse", None).unwrap();
        let b = derive_password_secret("correct horse", None).unwrap();
        assert_ne!(a.salt_b64, b.salt_b64);
        assert_ne!(a.hash_hex, b.hash_hex);
    }

    #[test]
    fn corrupt_salt_is_rejected() {
        assert!(matches!(
            derive_password_secret("pw", Some("not base64!!!")),
            Err(AuthError::InvalidSalt)
        ));
    }

    #[test]
    fn sha256_hex_matches_a_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_comparison_handles_mismatch_and_garbage() {
        let a = sha256_hex("one");
        let b = sha256_hex("two");
        assert!(digests_match(&a, &a));
        assert!(!digests_match(&a, &b));
        assert!(!digests_match(&a, "abcd"));
        assert!(!digests_match(&a, "not hex"));
    }
}
