//! Concord core library.
//!
//! This crate provides the collaborative versioning engine: optimistic
//! version gating, three-way merge with last-writer-wins fallback, atomic
//! version creation with content-hash deduplication, immutable history,
//! rollback for single nodes and whole folders, and a best-effort audit
//! trail, all over a pluggable storage layer with a bundled SQLite backend.

pub mod audit;
pub mod collab;
pub mod config;
pub mod content;
pub mod errors;
pub mod lock;
pub mod merge;
pub mod models;
pub mod store;
pub mod version;

// Re-exports for convenience.
pub use collab::{CollaborationService, CommitRequest};
pub use config::EngineConfig;
pub use content::NodeContent;
pub use errors::EngineError;
pub use store::sqlite::Database;
