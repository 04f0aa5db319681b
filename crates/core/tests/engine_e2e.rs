//! End-to-end tests for the collaborative versioning engine.
//!
//! These tests exercise the real `CollaborationService` with:
//! - A real SQLite database in a temp directory (via `EngineConfig`)
//! - The full checkout -> edit -> commit protocol
//! - Deterministic version-race simulation through a stale-reading store
//!
//! No network I/O and no wall-clock dependence.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use concord_core::audit::actions;
use concord_core::collab::{CollaborationService, CommitRequest};
use concord_core::config::EngineConfig;
use concord_core::content::NodeContent;
use concord_core::errors::{StoreError, VersionError};
use concord_core::models::{
    AuditRecord, ContentNode, MergeStatus, NodeType, Operation, OperatorType,
};
use concord_core::store::sqlite::Database;
use concord_core::store::{AuditStore, ContentStore, VersionStore};
use concord_core::version::{VersionRequest, VersionService};

// ===========================================================================
// Helpers
// ===========================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

fn open_engine(dir: &TempDir) -> CollaborationService {
    init_tracing();
    let config = EngineConfig {
        data_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    CollaborationService::open(&config).unwrap()
}

fn commit_str(
    engine: &CollaborationService,
    node_id: &str,
    operator_id: &str,
    base_version: i64,
    content: &str,
) -> concord_core::models::CommitResult {
    engine
        .commit(CommitRequest::new(
            node_id,
            OperatorType::Agent,
            operator_id,
            base_version,
            content,
        ))
        .unwrap()
}

// ===========================================================================
// Checkout -> commit protocol
// ===========================================================================

#[test]
fn test_full_protocol_single_writer() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    let node = engine
        .create_node("proj", "settings.json", NodeType::Json, None)
        .unwrap();

    let copy = engine
        .checkout(&node.id, OperatorType::Agent, "agent-1")
        .unwrap()
        .unwrap();
    assert_eq!(copy.base_version, 0);
    assert!(copy.content.is_none());

    let result = commit_str(
        &engine,
        &node.id,
        "agent-1",
        copy.base_version,
        r#"{"theme": "dark"}"#,
    );
    assert_eq!(result.status, MergeStatus::Clean);
    assert_eq!(result.version, 1);

    // The database file is real and reopenable.
    assert!(dir.path().join("concord.db").exists());

    let live = engine.get_node(&node.id).unwrap().unwrap();
    assert_eq!(live.current_version, 1);
    assert_eq!(
        live.content.unwrap().as_json().unwrap(),
        &json!({"theme": "dark"})
    );
}

#[test]
fn test_concurrent_json_writers_converge() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let node = engine
        .create_node("proj", "doc.json", NodeType::Json, None)
        .unwrap();
    commit_str(
        &engine,
        &node.id,
        "seed",
        0,
        r#"{"title": "draft", "count": 0}"#,
    );

    // Both writers check out version 1.
    let copy_x = engine
        .checkout(&node.id, OperatorType::Agent, "agent-x")
        .unwrap()
        .unwrap();
    let copy_y = engine
        .checkout(&node.id, OperatorType::Agent, "agent-y")
        .unwrap()
        .unwrap();
    assert_eq!(copy_x.base_version, 1);
    assert_eq!(copy_y.base_version, 1);

    // X lands first with a title edit; Y follows with a count edit.
    commit_str(
        &engine,
        &node.id,
        "agent-x",
        copy_x.base_version,
        r#"{"title": "final", "count": 0}"#,
    );
    let merged = commit_str(
        &engine,
        &node.id,
        "agent-y",
        copy_y.base_version,
        r#"{"title": "draft", "count": 7}"#,
    );

    assert_eq!(merged.status, MergeStatus::Merged);
    assert_eq!(merged.version, 3);
    assert_eq!(
        merged.final_content.as_json().unwrap(),
        &json!({"title": "final", "count": 7})
    );
}

#[test]
fn test_concurrent_text_writers_merge_distinct_lines() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let node = engine
        .create_node("proj", "notes.md", NodeType::Markdown, None)
        .unwrap();
    let base = "# Title\n\nintro paragraph\n\n## Section A\nbody a\n\n## Section B\nbody b\n";
    commit_str(&engine, &node.id, "seed", 0, base);

    // X rewrites the title; Y rewrites the last section body. The edits are
    // far enough apart that neither patch's context overlaps the other edit.
    let from_x = base.replace("# Title", "# Better Title");
    let from_y = base.replace("body b", "expanded body b");
    commit_str(&engine, &node.id, "agent-x", 1, &from_x);
    let merged = commit_str(&engine, &node.id, "agent-y", 1, &from_y);

    assert_eq!(merged.status, MergeStatus::Merged);
    let text = merged.final_content.as_text().unwrap();
    assert!(text.contains("# Better Title"));
    assert!(text.contains("expanded body b"));
}

#[test]
fn test_unmergeable_text_falls_back_to_lww() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let node = engine
        .create_node("proj", "notes.md", NodeType::Markdown, None)
        .unwrap();
    commit_str(&engine, &node.id, "seed", 0, "one line\n");

    commit_str(&engine, &node.id, "agent-x", 1, "x version\n");
    let result = commit_str(&engine, &node.id, "agent-y", 1, "y version\n");

    // The writer never blocks; the newest edit wins verbatim.
    assert_eq!(result.status, MergeStatus::Lww);
    assert_eq!(result.final_content.as_text(), Some("y version\n"));
    assert!(result.conflict_details.is_some());

    // And the loss of X's edit is attributable via the audit trail.
    let conflicts = engine.audit_for_action(actions::CONFLICT, 10).unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].operator_id, "agent-y");
    assert_eq!(conflicts[0].old_version, Some(2));
    assert_eq!(conflicts[0].new_version, Some(3));

    // X's version survives in history even though it lost the position.
    let v2 = engine.get_version_content(&node.id, 2).unwrap();
    assert_eq!(v2.content.unwrap().as_text(), Some("x version\n"));
}

// ===========================================================================
// Version race (CAS failure)
// ===========================================================================

/// A `ContentStore` whose node reads report one version behind the truth,
/// reproducing the read-then-lose interleaving of a version race.
struct StaleNodeStore {
    inner: Arc<Database>,
}

impl ContentStore for StaleNodeStore {
    fn get_node(&self, node_id: &str) -> Result<Option<ContentNode>, StoreError> {
        Ok(self.inner.get_node(node_id)?.map(|mut node| {
            node.current_version -= 1;
            node
        }))
    }

    fn insert_node(&self, node: &ContentNode) -> Result<(), StoreError> {
        self.inner.insert_node(node)
    }

    fn update_node(
        &self,
        node_id: &str,
        node_type: NodeType,
        content: Option<&NodeContent>,
        blob_ref: Option<&str>,
        content_hash: &str,
        new_version: i64,
        expected_version: i64,
    ) -> Result<Option<ContentNode>, StoreError> {
        self.inner.update_node(
            node_id,
            node_type,
            content,
            blob_ref,
            content_hash,
            new_version,
            expected_version,
        )
    }

    fn list_descendants(&self, folder_node_id: &str) -> Result<Vec<ContentNode>, StoreError> {
        self.inner.list_descendants(folder_node_id)
    }
}

#[test]
fn test_lost_version_race_surfaces_conflict_and_keeps_orphan() {
    let db = Arc::new(Database::in_memory().unwrap());
    db.initialize().unwrap();
    let node = ContentNode::new("proj", "doc.json", NodeType::Json);
    db.insert_node(&node).unwrap();

    let direct = VersionService::new(db.clone(), db.clone(), db.clone());
    for i in 1..=2 {
        direct
            .create_version(VersionRequest::update(
                &node.id,
                OperatorType::Agent,
                "winner",
                NodeContent::Json(json!({ "rev": i })),
            ))
            .unwrap()
            .unwrap();
    }

    // The racing writer saw version 1 before the winner landed version 2.
    let stale = VersionService::new(
        Arc::new(StaleNodeStore { inner: db.clone() }),
        db.clone(),
        db.clone(),
    );
    let result = stale.create_version(VersionRequest::update(
        &node.id,
        OperatorType::Agent,
        "loser",
        NodeContent::Json(json!({"rev": "lost"})),
    ));

    match result {
        Err(VersionError::VersionConflict {
            node_id: conflicted,
            expected_version,
        }) => {
            assert_eq!(conflicted, node.id);
            assert_eq!(expected_version, 1);
        }
        other => panic!("expected VersionConflict, got {other:?}"),
    }

    // Live node untouched; the loser's history row stays as an orphan.
    let live = db.get_node(&node.id).unwrap().unwrap();
    assert_eq!(live.current_version, 2);
    assert_eq!(
        live.content.unwrap().as_json().unwrap(),
        &json!({"rev": 2})
    );
    assert_eq!(db.count_by_node(&node.id).unwrap(), 3);

    // Point reads at the contested version still resolve deterministically.
    let v2 = direct.get_version_content(&node.id, 2).unwrap();
    assert_eq!(v2.operator_id, "winner");
}

// ===========================================================================
// Rollback
// ===========================================================================

#[test]
fn test_rollback_keeps_version_numbers_increasing() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let node = engine
        .create_node("proj", "doc.json", NodeType::Json, None)
        .unwrap();
    for i in 1..=3 {
        commit_str(
            &engine,
            &node.id,
            "agent-1",
            i - 1,
            &format!(r#"{{"rev": {i}}}"#),
        );
    }

    let first = engine
        .rollback_file(&node.id, 1, OperatorType::Human, "alice")
        .unwrap();
    assert_eq!(first.new_version, 4);

    // Roll forward again to version 3's content: still a new version.
    let second = engine
        .rollback_file(&node.id, 3, OperatorType::Human, "alice")
        .unwrap();
    assert_eq!(second.new_version, 5);

    let history = engine.get_version_history(&node.id, None).unwrap();
    let versions: Vec<i64> = history.items.iter().map(|v| v.version).collect();
    assert_eq!(versions, vec![5, 4, 3, 2, 1]);
    assert_eq!(history.items[0].operation, Operation::Rollback);
    assert_eq!(
        history.items[0].summary.as_deref(),
        Some("rollback to version 3")
    );

    let rollbacks = engine.audit_for_action(actions::ROLLBACK, 10).unwrap();
    assert_eq!(rollbacks.len(), 2);
}

#[test]
fn test_folder_snapshot_and_rollback_round_trip() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);

    let folder = engine
        .create_node("proj", "workspace", NodeType::Folder, None)
        .unwrap();
    let doc = engine
        .create_node("proj", "doc.json", NodeType::Json, Some(&folder.id))
        .unwrap();
    let notes = engine
        .create_node("proj", "notes.md", NodeType::Markdown, Some(&folder.id))
        .unwrap();
    commit_str(&engine, &doc.id, "agent-1", 0, r#"{"stage": "draft"}"#);
    commit_str(&engine, &notes.id, "agent-1", 0, "initial notes\n");

    let snapshot = engine
        .create_folder_snapshot(
            &folder.id,
            &[doc.id.clone(), notes.id.clone()],
            OperatorType::Agent,
            "agent-1",
        )
        .unwrap();
    assert_eq!(snapshot.files_count, 2);

    // Both members move past the snapshot.
    commit_str(&engine, &doc.id, "agent-2", 1, r#"{"stage": "final"}"#);
    commit_str(&engine, &notes.id, "agent-2", 1, "rewritten notes\n");

    let response = engine
        .rollback_folder(&folder.id, &snapshot.id, OperatorType::Human, "alice")
        .unwrap();
    assert_eq!(response.rolled_back.len(), 2);
    assert_eq!(response.unchanged, 0);

    // Content restored via new versions; snapshot count grew.
    let live_doc = engine.get_node(&doc.id).unwrap().unwrap();
    assert_eq!(live_doc.current_version, 3);
    assert_eq!(
        live_doc.content.unwrap().as_json().unwrap(),
        &json!({"stage": "draft"})
    );
    let live_notes = engine.get_node(&notes.id).unwrap().unwrap();
    assert_eq!(live_notes.content.unwrap().as_text(), Some("initial notes\n"));

    let snapshots = engine.get_snapshot_history(&folder.id, None).unwrap();
    assert_eq!(snapshots.total, 2);
    assert_eq!(snapshots.items[0].operation, "rollback");
    assert_eq!(
        snapshots.items[0].base_snapshot_id.as_deref(),
        Some(snapshot.id.as_str())
    );
}

// ===========================================================================
// Diff
// ===========================================================================

#[test]
fn test_diff_between_historical_versions() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let node = engine
        .create_node("proj", "doc.json", NodeType::Json, None)
        .unwrap();
    commit_str(
        &engine,
        &node.id,
        "agent-1",
        0,
        r#"{"meta": {"owner": "alice"}, "items": [1, 2]}"#,
    );
    commit_str(
        &engine,
        &node.id,
        "agent-1",
        1,
        r#"{"meta": {"owner": "bob"}, "items": [1, 2]}"#,
    );

    let report = engine.compute_diff(&node.id, 1, 2).unwrap();
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].path, "meta.owner");
    assert_eq!(report.entries[0].before, Some(json!("alice")));
    assert_eq!(report.entries[0].after, Some(json!("bob")));
}

// ===========================================================================
// Audit is best-effort
// ===========================================================================

/// An audit backend that always fails.
struct BrokenAudit;

impl AuditStore for BrokenAudit {
    fn insert_entry(&self, _record: &AuditRecord) -> Result<i64, StoreError> {
        Err(StoreError::NotFound {
            entity: "audit_log".into(),
            id: "unavailable".into(),
        })
    }

    fn recent_entries(&self, _limit: u32) -> Result<Vec<AuditRecord>, StoreError> {
        Err(StoreError::NotFound {
            entity: "audit_log".into(),
            id: "unavailable".into(),
        })
    }

    fn entries_for_action(
        &self,
        _action: &str,
        _limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        Err(StoreError::NotFound {
            entity: "audit_log".into(),
            id: "unavailable".into(),
        })
    }
}

#[test]
fn test_broken_audit_backend_never_blocks_writes() {
    let db = Arc::new(Database::in_memory().unwrap());
    db.initialize().unwrap();
    let engine = CollaborationService::new(
        db.clone(),
        db.clone(),
        db.clone(),
        Some(Arc::new(BrokenAudit)),
        Default::default(),
    );

    let node = engine
        .create_node("proj", "doc.json", NodeType::Json, None)
        .unwrap();
    let result = commit_str(&engine, &node.id, "agent-1", 0, r#"{"ok": true}"#);
    assert_eq!(result.version, 1);

    let rollback_target = commit_str(&engine, &node.id, "agent-1", 1, r#"{"ok": false}"#);
    assert_eq!(rollback_target.version, 2);
    engine
        .rollback_file(&node.id, 1, OperatorType::Human, "alice")
        .unwrap();
}

// ===========================================================================
// Configuration
// ===========================================================================

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("concord.toml");
    std::fs::write(
        &path,
        r#"
data_dir = "/tmp/concord-test"
log_level = "debug"

[history]
default_page_size = 10
max_page_size = 50
"#,
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.history.default_page_size, 10);
    assert_eq!(config.history.max_page_size, 50);
}

#[test]
fn test_config_rejects_inverted_page_sizes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("concord.toml");
    std::fs::write(
        &path,
        r#"
[history]
default_page_size = 100
max_page_size = 50
"#,
    )
    .unwrap();

    assert!(EngineConfig::load(&path).is_err());
}
