//! Typed query helpers implementing the repository traits on [`Database`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;

use super::Database;
use crate::content::NodeContent;
use crate::errors::StoreError;
use crate::models::{
    AuditRecord, ContentNode, FileVersion, FolderSnapshot, MergeStrategy, NodeType, Operation,
    OperatorType,
};
use crate::store::{AuditStore, ContentStore, SnapshotStore, VersionStore};

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

/// Parse a datetime string, returning `Utc::now()` as a fallback if parsing
/// fails.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Split typed content into the `json_doc` / `text_doc` column pair.
/// JSON is stored in canonical (key-sorted) string form.
fn content_to_cols(content: Option<&NodeContent>) -> (Option<String>, Option<String>) {
    match content {
        Some(c @ NodeContent::Json(_)) => (Some(c.canonical_string()), None),
        Some(NodeContent::Text(text)) => (None, Some(text.clone())),
        None => (None, None),
    }
}

/// Rebuild typed content from the column pair. A populated `json_doc` that
/// no longer parses is a corruption signal, surfaced as a conversion error.
fn content_from_cols(
    col_index: usize,
    json_doc: Option<String>,
    text_doc: Option<String>,
) -> rusqlite::Result<Option<NodeContent>> {
    if let Some(raw) = json_doc {
        let value = serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                col_index,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
        return Ok(Some(NodeContent::Json(value)));
    }
    Ok(text_doc.map(NodeContent::Text))
}

fn node_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentNode> {
    let node_type: String = row.get(2)?;
    let json_doc: Option<String> = row.get(3)?;
    let text_doc: Option<String> = row.get(4)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    Ok(ContentNode {
        id: row.get(0)?,
        project_id: row.get(1)?,
        node_type: NodeType::from_str_val(&node_type),
        content: content_from_cols(3, json_doc, text_doc)?,
        blob_ref: row.get(5)?,
        content_hash: row.get(6)?,
        current_version: row.get(7)?,
        parent_id: row.get(8)?,
        name: row.get(9)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

const NODE_COLUMNS: &str = "id, project_id, node_type, json_doc, text_doc, blob_ref, \
     content_hash, current_version, parent_id, name, created_at, updated_at";

fn version_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileVersion> {
    let json_doc: Option<String> = row.get(3)?;
    let text_doc: Option<String> = row.get(4)?;
    let operator_type: String = row.get(8)?;
    let operation: String = row.get(11)?;
    let merge_strategy: Option<String> = row.get(12)?;
    let created_at: String = row.get(15)?;
    Ok(FileVersion {
        id: row.get(0)?,
        node_id: row.get(1)?,
        version: row.get(2)?,
        content: content_from_cols(3, json_doc, text_doc)?,
        blob_ref: row.get(5)?,
        content_hash: row.get(6)?,
        size_bytes: row.get(7)?,
        operator_type: OperatorType::from_str_val(&operator_type),
        operator_id: row.get(9)?,
        session_id: row.get(10)?,
        operation: Operation::from_str_val(&operation),
        merge_strategy: merge_strategy.as_deref().map(MergeStrategy::from_str_val),
        summary: row.get(13)?,
        snapshot_id: row.get(14)?,
        created_at: parse_datetime(&created_at),
    })
}

const VERSION_COLUMNS: &str = "id, node_id, version, json_doc, text_doc, blob_ref, content_hash, \
     size_bytes, operator_type, operator_id, session_id, operation, merge_strategy, summary, \
     snapshot_id, created_at";

fn snapshot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FolderSnapshot> {
    let file_versions_raw: String = row.get(2)?;
    let changed_files_raw: String = row.get(3)?;
    let operator_type: String = row.get(6)?;
    let created_at: String = row.get(10)?;

    let file_versions: BTreeMap<String, i64> =
        serde_json::from_str(&file_versions_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let changed_files: Vec<String> = serde_json::from_str(&changed_files_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(FolderSnapshot {
        id: row.get(0)?,
        folder_node_id: row.get(1)?,
        file_versions,
        changed_files,
        files_count: row.get(4)?,
        changed_count: row.get(5)?,
        operator_type: OperatorType::from_str_val(&operator_type),
        operator_id: row.get(7)?,
        operation: row.get(8)?,
        base_snapshot_id: row.get(9)?,
        created_at: parse_datetime(&created_at),
    })
}

const SNAPSHOT_COLUMNS: &str = "id, folder_node_id, file_versions, changed_files, files_count, \
     changed_count, operator_type, operator_id, operation, base_snapshot_id, created_at";

fn audit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    let operator_type: String = row.get(3)?;
    let created_at: String = row.get(11)?;
    Ok(AuditRecord {
        id: Some(row.get(0)?),
        action: row.get(1)?,
        node_id: row.get(2)?,
        operator_type: OperatorType::from_str_val(&operator_type),
        operator_id: row.get(4)?,
        old_version: row.get(5)?,
        new_version: row.get(6)?,
        status: row.get(7)?,
        strategy: row.get(8)?,
        conflict_details: row.get(9)?,
        metadata: row.get(10)?,
        created_at: parse_datetime(&created_at),
    })
}

const AUDIT_COLUMNS: &str = "id, action, node_id, operator_type, operator_id, old_version, \
     new_version, status, strategy, conflict_details, metadata, created_at";

// ---------------------------------------------------------------------------
// ContentStore
// ---------------------------------------------------------------------------

impl ContentStore for Database {
    fn get_node(&self, node_id: &str) -> Result<Option<ContentNode>, StoreError> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!("SELECT {NODE_COLUMNS} FROM content_nodes WHERE id = ?1"),
            params![node_id],
            node_from_row,
        );
        match result {
            Ok(node) => Ok(Some(node)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn insert_node(&self, node: &ContentNode) -> Result<(), StoreError> {
        let (json_doc, text_doc) = content_to_cols(node.content.as_ref());
        let conn = self.conn();
        conn.execute(
            "INSERT INTO content_nodes (id, project_id, node_type, json_doc, text_doc, blob_ref,
             content_hash, current_version, parent_id, name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                node.id,
                node.project_id,
                node.node_type.to_string(),
                json_doc,
                text_doc,
                node.blob_ref,
                node.content_hash,
                node.current_version,
                node.parent_id,
                node.name,
                node.created_at.to_rfc3339(),
                node.updated_at.to_rfc3339(),
            ],
        )?;
        debug!(node_id = %node.id, node_type = %node.node_type, "inserted content node");
        Ok(())
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
        let (json_doc, text_doc) = content_to_cols(content);
        let now = Utc::now().to_rfc3339();

        // The single conditional write that serializes each node's version
        // chain. Zero affected rows means another writer got there first.
        let changed = {
            let conn = self.conn();
            conn.execute(
                "UPDATE content_nodes
                 SET node_type = ?1, json_doc = ?2, text_doc = ?3, blob_ref = ?4,
                     content_hash = ?5, current_version = ?6, updated_at = ?7
                 WHERE id = ?8 AND current_version = ?9",
                params![
                    node_type.to_string(),
                    json_doc,
                    text_doc,
                    blob_ref,
                    content_hash,
                    new_version,
                    now,
                    node_id,
                    expected_version,
                ],
            )?
        };

        if changed == 0 {
            debug!(node_id, expected_version, "conditional node update matched no rows");
            return Ok(None);
        }
        debug!(node_id, new_version, "updated content node");
        self.get_node(node_id)
    }

    fn list_descendants(&self, folder_node_id: &str) -> Result<Vec<ContentNode>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "WITH RECURSIVE descendants(id) AS (
                 SELECT id FROM content_nodes WHERE parent_id = ?1
                 UNION ALL
                 SELECT c.id FROM content_nodes c
                 JOIN descendants d ON c.parent_id = d.id
             )
             SELECT {NODE_COLUMNS} FROM content_nodes
             WHERE id IN (SELECT id FROM descendants)
             ORDER BY id"
        ))?;
        let nodes = stmt
            .query_map(params![folder_node_id], node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }
}

// ---------------------------------------------------------------------------
// VersionStore
// ---------------------------------------------------------------------------

impl VersionStore for Database {
    fn insert_version(&self, version: &FileVersion) -> Result<(), StoreError> {
        let (json_doc, text_doc) = content_to_cols(version.content.as_ref());
        let conn = self.conn();
        conn.execute(
            "INSERT INTO file_versions (id, node_id, version, json_doc, text_doc, blob_ref,
             content_hash, size_bytes, operator_type, operator_id, session_id, operation,
             merge_strategy, summary, snapshot_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                version.id,
                version.node_id,
                version.version,
                json_doc,
                text_doc,
                version.blob_ref,
                version.content_hash,
                version.size_bytes,
                version.operator_type.to_string(),
                version.operator_id,
                version.session_id,
                version.operation.to_string(),
                version.merge_strategy.map(|s| s.to_string()),
                version.summary,
                version.snapshot_id,
                version.created_at.to_rfc3339(),
            ],
        )?;
        debug!(
            node_id = %version.node_id,
            version = version.version,
            operation = %version.operation,
            "inserted file version"
        );
        Ok(())
    }

    fn get_by_node_and_version(
        &self,
        node_id: &str,
        version: i64,
    ) -> Result<Option<FileVersion>, StoreError> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!(
                // Orphan rows from lost version races can duplicate a
                // (node_id, version) pair; pick one row deterministically.
                "SELECT {VERSION_COLUMNS} FROM file_versions
                 WHERE node_id = ?1 AND version = ?2
                 ORDER BY created_at ASC, id ASC LIMIT 1"
            ),
            params![node_id, version],
            version_from_row,
        );
        match result {
            Ok(fv) => Ok(Some(fv)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_by_node(
        &self,
        node_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<FileVersion>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM file_versions
             WHERE node_id = ?1 ORDER BY version DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let versions = stmt
            .query_map(params![node_id, limit, offset], version_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    fn count_by_node(&self, node_id: &str) -> Result<i64, StoreError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM file_versions WHERE node_id = ?1",
            params![node_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn find_by_hash(
        &self,
        node_id: &str,
        content_hash: &str,
    ) -> Result<Option<FileVersion>, StoreError> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!(
                "SELECT {VERSION_COLUMNS} FROM file_versions
                 WHERE node_id = ?1 AND content_hash = ?2 ORDER BY version DESC LIMIT 1"
            ),
            params![node_id, content_hash],
            version_from_row,
        );
        match result {
            Ok(fv) => Ok(Some(fv)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn latest_by_node(&self, node_id: &str) -> Result<Option<FileVersion>, StoreError> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!(
                "SELECT {VERSION_COLUMNS} FROM file_versions
                 WHERE node_id = ?1 ORDER BY version DESC LIMIT 1"
            ),
            params![node_id],
            version_from_row,
        );
        match result {
            Ok(fv) => Ok(Some(fv)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn bulk_update_snapshot_id(
        &self,
        members: &[(String, i64)],
        snapshot_id: &str,
    ) -> Result<u64, StoreError> {
        let updated = self.transaction(|conn| {
            let mut total: u64 = 0;
            for (node_id, version) in members {
                let changed = conn.execute(
                    "UPDATE file_versions SET snapshot_id = ?1
                     WHERE node_id = ?2 AND version = ?3",
                    params![snapshot_id, node_id, version],
                )?;
                total += changed as u64;
            }
            Ok(total)
        })?;
        debug!(snapshot_id, updated, "back-linked file versions to snapshot");
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

impl SnapshotStore for Database {
    fn insert_snapshot(&self, snapshot: &FolderSnapshot) -> Result<(), StoreError> {
        let file_versions = serde_json::to_string(&snapshot.file_versions).unwrap_or_default();
        let changed_files = serde_json::to_string(&snapshot.changed_files).unwrap_or_default();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO folder_snapshots (id, folder_node_id, file_versions, changed_files,
             files_count, changed_count, operator_type, operator_id, operation,
             base_snapshot_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                snapshot.id,
                snapshot.folder_node_id,
                file_versions,
                changed_files,
                snapshot.files_count,
                snapshot.changed_count,
                snapshot.operator_type.to_string(),
                snapshot.operator_id,
                snapshot.operation,
                snapshot.base_snapshot_id,
                snapshot.created_at.to_rfc3339(),
            ],
        )?;
        debug!(
            snapshot_id = %snapshot.id,
            folder = %snapshot.folder_node_id,
            files = snapshot.files_count,
            "inserted folder snapshot"
        );
        Ok(())
    }

    fn get_snapshot(&self, snapshot_id: &str) -> Result<Option<FolderSnapshot>, StoreError> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!("SELECT {SNAPSHOT_COLUMNS} FROM folder_snapshots WHERE id = ?1"),
            params![snapshot_id],
            snapshot_from_row,
        );
        match result {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_by_folder(
        &self,
        folder_node_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<FolderSnapshot>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM folder_snapshots
             WHERE folder_node_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let snapshots = stmt
            .query_map(params![folder_node_id, limit, offset], snapshot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    fn count_by_folder(&self, folder_node_id: &str) -> Result<i64, StoreError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM folder_snapshots WHERE folder_node_id = ?1",
            params![folder_node_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// AuditStore
// ---------------------------------------------------------------------------

impl AuditStore for Database {
    fn insert_entry(&self, record: &AuditRecord) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO audit_log (action, node_id, operator_type, operator_id, old_version,
             new_version, status, strategy, conflict_details, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.action,
                record.node_id,
                record.operator_type.to_string(),
                record.operator_id,
                record.old_version,
                record.new_version,
                record.status,
                record.strategy,
                record.conflict_details,
                record.metadata,
                record.created_at.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, action = %record.action, node_id = %record.node_id, "inserted audit entry");
        Ok(id)
    }

    fn recent_entries(&self, limit: u32) -> Result<Vec<AuditRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY id DESC LIMIT ?1"
        ))?;
        let entries = stmt
            .query_map(params![limit], audit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn entries_for_action(
        &self,
        action: &str,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE action = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let entries = stmt
            .query_map(params![action, limit], audit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn sample_node(project: &str, name: &str) -> ContentNode {
        ContentNode::new(project, name, NodeType::Json)
    }

    fn sample_version(node_id: &str, version: i64, content: NodeContent) -> FileVersion {
        FileVersion {
            id: uuid::Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            version,
            content_hash: content.content_hash(),
            size_bytes: content.size_bytes(),
            content: Some(content),
            blob_ref: None,
            operator_type: OperatorType::Agent,
            operator_id: "agent-1".into(),
            session_id: None,
            operation: Operation::Update,
            merge_strategy: Some(MergeStrategy::Direct),
            summary: None,
            snapshot_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_node_insert_and_get() {
        let db = setup_db();
        let mut node = sample_node("proj", "doc.json");
        node.content = Some(NodeContent::Json(json!({"b": 2, "a": 1})));
        db.insert_node(&node).unwrap();

        let loaded = db.get_node(&node.id).unwrap().unwrap();
        assert_eq!(loaded.project_id, "proj");
        assert_eq!(loaded.current_version, 0);
        // Stored canonically, reloaded as equal JSON.
        assert_eq!(
            loaded.content.unwrap().as_json().unwrap(),
            &json!({"a": 1, "b": 2})
        );

        assert!(db.get_node("missing").unwrap().is_none());
    }

    #[test]
    fn test_update_node_cas() {
        let db = setup_db();
        let node = sample_node("proj", "doc.json");
        db.insert_node(&node).unwrap();

        let content = NodeContent::Json(json!({"x": 1}));
        let updated = db
            .update_node(
                &node.id,
                NodeType::Json,
                Some(&content),
                None,
                &content.content_hash(),
                1,
                0,
            )
            .unwrap();
        assert_eq!(updated.unwrap().current_version, 1);

        // Stale expected_version matches zero rows.
        let stale = db
            .update_node(
                &node.id,
                NodeType::Json,
                Some(&content),
                None,
                &content.content_hash(),
                2,
                0,
            )
            .unwrap();
        assert!(stale.is_none());
        assert_eq!(db.get_node(&node.id).unwrap().unwrap().current_version, 1);
    }

    #[test]
    fn test_list_descendants_recursive() {
        let db = setup_db();
        let folder = ContentNode::new("proj", "root", NodeType::Folder);
        let sub = ContentNode::new("proj", "sub", NodeType::Folder).with_parent(&folder.id);
        let a = sample_node("proj", "a.json").with_parent(&folder.id);
        let b = sample_node("proj", "b.json").with_parent(&sub.id);
        for n in [&folder, &sub, &a, &b] {
            db.insert_node(n).unwrap();
        }

        let descendants = db.list_descendants(&folder.id).unwrap();
        let ids: Vec<&str> = descendants.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(descendants.len(), 3);
        assert!(ids.contains(&sub.id.as_str()));
        assert!(ids.contains(&a.id.as_str()));
        assert!(ids.contains(&b.id.as_str()));
    }

    #[test]
    fn test_version_history_queries() {
        let db = setup_db();
        let node = sample_node("proj", "doc.json");
        db.insert_node(&node).unwrap();

        for i in 1..=3 {
            let fv = sample_version(&node.id, i, NodeContent::Json(json!({ "rev": i })));
            db.insert_version(&fv).unwrap();
        }

        assert_eq!(db.count_by_node(&node.id).unwrap(), 3);
        let latest = db.latest_by_node(&node.id).unwrap().unwrap();
        assert_eq!(latest.version, 3);

        let page = db.list_by_node(&node.id, 2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].version, 3);
        assert_eq!(page[1].version, 2);

        let v2 = db.get_by_node_and_version(&node.id, 2).unwrap().unwrap();
        assert_eq!(v2.content.unwrap().as_json().unwrap(), &json!({"rev": 2}));

        let hash = NodeContent::Json(json!({"rev": 1})).content_hash();
        let found = db.find_by_hash(&node.id, &hash).unwrap().unwrap();
        assert_eq!(found.version, 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let db = setup_db();
        let mut map = BTreeMap::new();
        map.insert("n1".to_string(), 3i64);
        map.insert("n2".to_string(), 1i64);
        let snapshot = FolderSnapshot {
            id: "snap-1".into(),
            folder_node_id: "folder-1".into(),
            file_versions: map.clone(),
            changed_files: vec!["n1".into()],
            files_count: 2,
            changed_count: 1,
            operator_type: OperatorType::Human,
            operator_id: "alice".into(),
            operation: "snapshot".into(),
            base_snapshot_id: None,
            created_at: Utc::now(),
        };
        db.insert_snapshot(&snapshot).unwrap();

        let loaded = db.get_snapshot("snap-1").unwrap().unwrap();
        assert_eq!(loaded.file_versions, map);
        assert_eq!(loaded.changed_files, vec!["n1".to_string()]);
        assert_eq!(db.count_by_folder("folder-1").unwrap(), 1);
        assert_eq!(db.list_by_folder("folder-1", 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_bulk_snapshot_backlink() {
        let db = setup_db();
        let node = sample_node("proj", "doc.json");
        db.insert_node(&node).unwrap();
        let fv = sample_version(&node.id, 1, NodeContent::Text("hello".into()));
        db.insert_version(&fv).unwrap();

        let updated = db
            .bulk_update_snapshot_id(&[(node.id.clone(), 1), ("missing".into(), 9)], "snap-9")
            .unwrap();
        assert_eq!(updated, 1);

        let reloaded = db.get_by_node_and_version(&node.id, 1).unwrap().unwrap();
        assert_eq!(reloaded.snapshot_id.as_deref(), Some("snap-9"));
    }

    #[test]
    fn test_audit_entries() {
        let db = setup_db();
        let mut record = AuditRecord::new("commit", "n1", OperatorType::Agent, "agent-1");
        record.old_version = Some(1);
        record.new_version = Some(2);
        record.status = Some("clean".into());
        let id = db.insert_entry(&record).unwrap();
        assert!(id > 0);

        db.insert_entry(&AuditRecord::new("checkout", "n1", OperatorType::Human, "bob"))
            .unwrap();

        let recent = db.recent_entries(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "checkout");

        let commits = db.entries_for_action("commit", 10).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].new_version, Some(2));
    }
}
