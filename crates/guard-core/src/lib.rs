//! Guardian Core Library
//!
//! This crate provides the shared vocabulary of the Guardian content-access
//! policy engine: the compiled rule model, string normalization for policy
//! list entries, a reference navigation matcher, the block-notice payload,
//! and the persistence collaborator abstraction.
//!
//! # Architecture
//!
//! Guardian never edits installed rules in place. The compiler (in
//! `guard-compiler`) turns the mutable policy lists into a complete,
//! priority-ordered rule set and swaps it in as a whole; the matcher here
//! evaluates such a set against a top-level navigation URL with the same
//! contract the external enforcement layer applies.
//!
//! # Modules
//!
//! - `types`: rule actions, matchers, id families, and priority tiers
//! - `normalize`: canonicalization and admission of list entries
//! - `url`: http(s) scheme and host extraction
//! - `matcher`: reference evaluation of an emitted rule set
//! - `notice`: block-notice query payload and display helpers
//! - `storage`: async key-value collaborator with change notifications

pub mod matcher;
pub mod normalize;
pub mod notice;
pub mod storage;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use matcher::{match_navigation, NavigationVerdict};
pub use notice::BlockNotice;
pub use storage::{ChangeNotification, MemoryStore, StorageBackend, StorageError};
pub use types::{BlockKind, CompiledRule, RuleAction, RuleFamily, RuleSet, UrlMatcher};
