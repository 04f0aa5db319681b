//! Database schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The SQLite
//! `user_version` pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::StoreError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
/// Versions start at 1.
static MIGRATIONS: &[(u32, &str, &str)] = &[(
    1,
    "initial schema",
    r#"
    CREATE TABLE IF NOT EXISTS content_nodes (
        id              TEXT PRIMARY KEY,
        project_id      TEXT    NOT NULL,
        node_type       TEXT    NOT NULL CHECK (node_type IN ('json', 'markdown', 'folder', 'binary')),
        json_doc        TEXT,
        text_doc        TEXT,
        blob_ref        TEXT,
        content_hash    TEXT,
        current_version INTEGER NOT NULL DEFAULT 0,
        parent_id       TEXT,
        name            TEXT    NOT NULL DEFAULT '',
        created_at      TEXT    NOT NULL,
        updated_at      TEXT    NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_content_nodes_project ON content_nodes (project_id);
    CREATE INDEX IF NOT EXISTS idx_content_nodes_parent ON content_nodes (parent_id);

    CREATE TABLE IF NOT EXISTS file_versions (
        id              TEXT PRIMARY KEY,
        node_id         TEXT    NOT NULL,
        version         INTEGER NOT NULL,
        json_doc        TEXT,
        text_doc        TEXT,
        blob_ref        TEXT,
        content_hash    TEXT    NOT NULL,
        size_bytes      INTEGER NOT NULL DEFAULT 0,
        operator_type   TEXT    NOT NULL,
        operator_id     TEXT    NOT NULL,
        session_id      TEXT,
        operation       TEXT    NOT NULL CHECK (operation IN ('update', 'rollback', 'delete')),
        merge_strategy  TEXT,
        summary         TEXT,
        snapshot_id     TEXT,
        created_at      TEXT    NOT NULL
    );
    -- No uniqueness on (node_id, version): a writer that loses the
    -- version race leaves its already-inserted row behind as an accepted
    -- orphan-history entry.

    CREATE INDEX IF NOT EXISTS idx_file_versions_node ON file_versions (node_id, version DESC);
    CREATE INDEX IF NOT EXISTS idx_file_versions_hash ON file_versions (node_id, content_hash);

    CREATE TABLE IF NOT EXISTS folder_snapshots (
        id               TEXT PRIMARY KEY,
        folder_node_id   TEXT    NOT NULL,
        file_versions    TEXT    NOT NULL,
        changed_files    TEXT    NOT NULL DEFAULT '[]',
        files_count      INTEGER NOT NULL DEFAULT 0,
        changed_count    INTEGER NOT NULL DEFAULT 0,
        operator_type    TEXT    NOT NULL,
        operator_id      TEXT    NOT NULL,
        operation        TEXT    NOT NULL DEFAULT 'snapshot',
        base_snapshot_id TEXT,
        created_at       TEXT    NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_folder_snapshots_folder
        ON folder_snapshots (folder_node_id, created_at DESC);

    CREATE TABLE IF NOT EXISTS audit_log (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        action           TEXT NOT NULL,
        node_id          TEXT NOT NULL,
        operator_type    TEXT NOT NULL,
        operator_id      TEXT NOT NULL,
        old_version      INTEGER,
        new_version      INTEGER,
        status           TEXT,
        strategy         TEXT,
        conflict_details TEXT,
        metadata         TEXT,
        created_at       TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_log_node ON audit_log (node_id);
    CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log (action);
    "#,
)];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking database migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| StoreError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

/// Read the current schema version from the SQLite `user_version` pragma.
fn get_schema_version(conn: &Connection) -> Result<u32, StoreError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Set the schema version via the SQLite `user_version` pragma.
fn set_schema_version(conn: &Connection, version: u32) -> Result<(), StoreError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}
