//! Guardian Rule Compiler
//!
//! This crate turns the mutable policy lists into the installed rule set and
//! keeps the two consistent across concurrent mutation.
//!
//! # Modules
//!
//! - `lists`: list-store snapshot reading and mutation helpers
//! - `compile`: the compilation pass (normalize, dedup, expire, build)
//! - `engine`: the atomic full-replacement protocol against a rule sink
//! - `sync`: the storage-change synchronization trigger
//! - `blocklog`: the block-event log fed by the block notice

pub mod blocklog;
pub mod compile;
pub mod engine;
pub mod lists;
pub mod sync;

pub use compile::{compile, CompileError};
pub use engine::{Engine, EngineError, MemorySink, RebuildSummary, RuleSink, SinkError};
pub use lists::{ListError, ListSnapshot, TemporaryAllowEntry};
pub use sync::{is_trigger_change, SyncTrigger, TRIGGER_KEYS};
