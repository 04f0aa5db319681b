//! Error types for the Concord core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`EngineError`] enum unifies them for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Versioning errors
// ---------------------------------------------------------------------------

/// Errors from the versioning subsystem.
///
/// `VersionConflict` is the optimistic-concurrency signal: the conditional
/// node update matched zero rows because another writer bumped the version
/// first. The already-inserted `FileVersion` row is intentionally left in
/// place; the caller must retry the full checkout -> commit sequence.
#[derive(Debug, Error)]
pub enum VersionError {
    /// The content node does not exist.
    #[error("content node not found: {0}")]
    NodeNotFound(String),

    /// The requested historical version does not exist.
    #[error("version {version} not found for node {node_id}")]
    VersionNotFound { node_id: String, version: i64 },

    /// The requested folder snapshot does not exist.
    #[error("folder snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Another writer won the compare-and-swap on `current_version`.
    #[error("version conflict on node {node_id}: expected version {expected_version} was stale")]
    VersionConflict {
        node_id: String,
        expected_version: i64,
    },

    /// Rollback target content is identical to the live content.
    #[error("node {node_id} is already at the content of version {version}")]
    AlreadyAtTarget { node_id: String, version: i64 },

    /// The snapshot belongs to a different folder.
    #[error("snapshot {snapshot_id} does not belong to folder {folder_node_id}")]
    SnapshotMismatch {
        snapshot_id: String,
        folder_node_id: String,
    },

    /// Folder rollback found no member that differs from the snapshot.
    #[error("folder {0} already matches the target snapshot, nothing to roll back")]
    NothingToRollback(String),

    /// A folder operation was requested on a non-folder node.
    #[error("node {0} is not a folder")]
    NotAFolder(String),

    /// Underlying store error.
    #[error("version store error: {0}")]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = VersionError::NodeNotFound("node-1".into());
        assert_eq!(err.to_string(), "content node not found: node-1");

        let err = VersionError::VersionConflict {
            node_id: "node-1".into(),
            expected_version: 5,
        };
        assert!(err.to_string().contains("expected version 5"));

        let err = StoreError::NotFound {
            entity: "file_version".into(),
            id: "abc".into(),
        };
        assert_eq!(err.to_string(), "file_version not found: abc");

        let err = ConfigError::InvalidValue {
            field: "history.max_page_size".into(),
            detail: "must be > 0".into(),
        };
        assert!(err.to_string().contains("history.max_page_size"));
    }

    #[test]
    fn test_engine_error_from_subsystem() {
        let v_err = VersionError::SnapshotNotFound("snap".into());
        let engine_err: EngineError = v_err.into();
        assert!(matches!(engine_err, EngineError::Version(_)));

        let s_err = StoreError::NotFound {
            entity: "node".into(),
            id: "x".into(),
        };
        let engine_err: EngineError = s_err.into();
        assert!(matches!(engine_err, EngineError::Store(_)));
    }
}
