//! Guardian Credential Subsystem
//!
//! Every mutation of the policy lists is gated behind this crate: a slow
//! salted password digest, ten single-use recovery codes, and one reusable
//! recovery phrase. Only digests are ever persisted.
//!
//! # Modules
//!
//! - `secret`: the KDF and digest primitives
//! - `credential`: verification and recovery-kit lifecycle against the store
//! - `session`: the process-local unlock window
//! - `wordlist`: the embedded recovery-phrase vocabulary

pub mod credential;
pub mod secret;
pub mod session;
pub mod wordlist;

use thiserror::Error;

use guard_core::storage::StorageError;

pub use credential::{
    generate_recovery_kit, has_password, set_password, verify_credential, RecoveryKit,
    Verification, VerifyMethod, MIN_PASSWORD_LEN,
};
pub use secret::{derive_password_secret, sha256_hex, PasswordSecret, PBKDF2_ROUNDS};
pub use session::UnlockSession;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("stored salt is not valid base64")]
    InvalidSalt,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,
    #[error(transparent)]
    Storage(#[from] StorageError),
}
