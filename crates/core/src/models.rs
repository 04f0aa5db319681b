//! Domain model types used throughout Concord.
//!
//! These types bridge the versioning engine, the store layer, and upstream
//! callers (sync bridges, workspace providers, API layers).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::NodeContent;

// ---------------------------------------------------------------------------
// Node type
// ---------------------------------------------------------------------------

/// Declared type of a content node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Json,
    Markdown,
    Folder,
    Binary,
}

impl NodeType {
    /// Parse a type string into a `NodeType`. Unknown strings fall back to
    /// markdown, the loosest content representation.
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            "folder" => Self::Folder,
            "binary" => Self::Binary,
            _ => Self::Markdown,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Markdown => write!(f, "markdown"),
            Self::Folder => write!(f, "folder"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Who performed an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    Agent,
    Human,
    System,
}

impl OperatorType {
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "agent" => Self::Agent,
            "human" => Self::Human,
            _ => Self::System,
        }
    }
}

impl std::fmt::Display for OperatorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Human => write!(f, "human"),
            Self::System => write!(f, "system"),
        }
    }
}

// ---------------------------------------------------------------------------
// Version operation
// ---------------------------------------------------------------------------

/// Kind of write recorded by a file version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Update,
    Rollback,
    Delete,
}

impl Operation {
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "rollback" => Self::Rollback,
            "delete" => Self::Delete,
            _ => Self::Update,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Rollback => write!(f, "rollback"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge status & strategy
// ---------------------------------------------------------------------------

/// Outcome category of a commit's conflict resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    /// No reconciliation needed; the write applied directly.
    Clean,
    /// Base/current/new were automatically merged.
    Merged,
    /// Automatic merge failed; the new content won (last-writer-wins).
    Lww,
}

impl std::fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Merged => write!(f, "merged"),
            Self::Lww => write!(f, "lww"),
        }
    }
}

/// How the final content of a commit was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Direct write, no merge performed.
    Direct,
    /// Key-level three-way merge of JSON documents.
    JsonKey,
    /// Line-level diff3-style merge of text.
    LineDiff3,
    /// Last-writer-wins fallback.
    Lww,
}

impl MergeStrategy {
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "json_key" => Self::JsonKey,
            "line_diff3" => Self::LineDiff3,
            "lww" => Self::Lww,
            _ => Self::Direct,
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::JsonKey => write!(f, "json_key"),
            Self::LineDiff3 => write!(f, "line_diff3"),
            Self::Lww => write!(f, "lww"),
        }
    }
}

// ---------------------------------------------------------------------------
// Content node
// ---------------------------------------------------------------------------

/// The unit of versioned content: a JSON document, Markdown text, a folder,
/// or a binary placeholder (hash/size bookkeeping only).
///
/// Mutated only through the version service. `current_version` and
/// `content_hash` are the concurrency anchor: every conditional update is
/// gated on the version read before the write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: String,
    pub project_id: String,
    pub node_type: NodeType,
    pub content: Option<NodeContent>,
    /// Reference into the blob store for binary nodes.
    pub blob_ref: Option<String>,
    pub content_hash: Option<String>,
    /// Monotonic, >= 0. Equals the latest FileVersion's version, 0 if none.
    pub current_version: i64,
    pub parent_id: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentNode {
    /// Create a fresh, unversioned node.
    pub fn new(project_id: &str, name: &str, node_type: NodeType) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            node_type,
            content: None,
            blob_ref: None,
            content_hash: None,
            current_version: 0,
            parent_id: None,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Place the node under a parent folder.
    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// File version
// ---------------------------------------------------------------------------

/// One immutable, append-only entry in a node's version history.
///
/// Versions are strictly increasing per node, starting at 1. Rows are never
/// updated after insert except for the optional `snapshot_id` back-link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersion {
    pub id: String,
    pub node_id: String,
    pub version: i64,
    pub content: Option<NodeContent>,
    pub blob_ref: Option<String>,
    pub content_hash: String,
    pub size_bytes: i64,
    pub operator_type: OperatorType,
    pub operator_id: String,
    pub session_id: Option<String>,
    pub operation: Operation,
    pub merge_strategy: Option<MergeStrategy>,
    pub summary: Option<String>,
    pub snapshot_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Folder snapshot
// ---------------------------------------------------------------------------

/// An immutable version-vector over every non-folder descendant of a folder
/// at one instant. The map is complete, not a delta against
/// `base_snapshot_id`; restore is a single lookup per member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSnapshot {
    pub id: String,
    pub folder_node_id: String,
    /// node_id -> version captured for that node.
    pub file_versions: BTreeMap<String, i64>,
    /// Nodes the caller declared as contributing to this snapshot.
    pub changed_files: Vec<String>,
    pub files_count: i64,
    pub changed_count: i64,
    pub operator_type: OperatorType,
    pub operator_id: String,
    /// Free-form label, e.g. "snapshot" or "rollback".
    pub operation: String,
    pub base_snapshot_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Transients
// ---------------------------------------------------------------------------

/// Read snapshot returned by checkout. Never persisted; the caller mutates
/// a copy locally and commits against `base_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingCopy {
    pub node_id: String,
    pub node_type: NodeType,
    pub content: Option<NodeContent>,
    pub base_version: i64,
    pub content_hash: Option<String>,
}

/// Attribution for a merge that could not complete automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictDetails {
    pub node_id: String,
    pub operator_id: String,
    pub strategy_attempted: MergeStrategy,
    pub message: String,
}

/// Output of the pure three-way merge function.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub node_id: String,
    pub status: MergeStatus,
    pub merged_content: NodeContent,
    pub strategy_used: MergeStrategy,
    pub conflict_details: Option<ConflictDetails>,
}

/// Result of a commit.
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub node_id: String,
    pub status: MergeStatus,
    pub version: i64,
    pub final_content: NodeContent,
    pub strategy: MergeStrategy,
    pub conflict_details: Option<ConflictDetails>,
}

/// Result of a single-node rollback. Rollback always creates a new version;
/// `new_version` is strictly greater than the version rolled back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResponse {
    pub node_id: String,
    pub rolled_back_to: i64,
    pub new_version: i64,
    pub content_hash: String,
}

/// Result of a whole-folder rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderRollbackResponse {
    pub folder_node_id: String,
    pub target_snapshot_id: String,
    /// The snapshot created to record the post-rollback state.
    pub new_snapshot_id: String,
    pub rolled_back: Vec<RollbackResponse>,
    /// Members already at their snapshot version, untouched.
    pub unchanged: u64,
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Kind of difference at one JSON key path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Removed,
    Changed,
}

/// One differing key path between two JSON versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffEntry {
    /// Dot-joined key path, e.g. `settings.theme`.
    pub path: String,
    pub kind: DiffKind,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

/// Comparison of two historical versions of one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffReport {
    pub node_id: String,
    pub from_version: i64,
    pub to_version: i64,
    /// Key-path entries for JSON payloads; empty for text/blob.
    pub entries: Vec<DiffEntry>,
    /// Byte delta, the only comparison available for text/blob payloads.
    pub size_delta: i64,
}

// ---------------------------------------------------------------------------
// Audit record
// ---------------------------------------------------------------------------

/// One best-effort audit-trail row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Assigned by the store; `None` before insert.
    pub id: Option<i64>,
    pub action: String,
    pub node_id: String,
    pub operator_type: OperatorType,
    pub operator_id: String,
    pub old_version: Option<i64>,
    pub new_version: Option<i64>,
    pub status: Option<String>,
    pub strategy: Option<String>,
    /// JSON-serialized [`ConflictDetails`], if any.
    pub conflict_details: Option<String>,
    /// Free-form JSON metadata.
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a bare record for `action` on `node_id`.
    pub fn new(action: &str, node_id: &str, operator_type: OperatorType, operator_id: &str) -> Self {
        Self {
            id: None,
            action: action.to_string(),
            node_id: node_id.to_string(),
            operator_type,
            operator_id: operator_id.to_string(),
            old_version: None,
            new_version: None,
            status: None,
            strategy: None,
            conflict_details: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Limit/offset window for history queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

/// A windowed result set with the total row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trips() {
        for (ty, s) in [
            (NodeType::Json, "json"),
            (NodeType::Markdown, "markdown"),
            (NodeType::Folder, "folder"),
            (NodeType::Binary, "binary"),
        ] {
            assert_eq!(ty.to_string(), s);
            assert_eq!(NodeType::from_str_val(s), ty);
        }

        for (op, s) in [
            (Operation::Update, "update"),
            (Operation::Rollback, "rollback"),
            (Operation::Delete, "delete"),
        ] {
            assert_eq!(op.to_string(), s);
            assert_eq!(Operation::from_str_val(s), op);
        }

        for (strat, s) in [
            (MergeStrategy::Direct, "direct"),
            (MergeStrategy::JsonKey, "json_key"),
            (MergeStrategy::LineDiff3, "line_diff3"),
            (MergeStrategy::Lww, "lww"),
        ] {
            assert_eq!(strat.to_string(), s);
            assert_eq!(MergeStrategy::from_str_val(s), strat);
        }
    }

    #[test]
    fn test_new_node_defaults() {
        let node = ContentNode::new("proj-1", "notes.md", NodeType::Markdown);
        assert_eq!(node.current_version, 0);
        assert!(node.content.is_none());
        assert!(node.content_hash.is_none());
        assert!(node.parent_id.is_none());

        let child = ContentNode::new("proj-1", "child.md", NodeType::Markdown)
            .with_parent(&node.id);
        assert_eq!(child.parent_id.as_deref(), Some(node.id.as_str()));
    }

    #[test]
    fn test_page_default() {
        let page = Page::default();
        assert_eq!(page.limit, 20);
        assert_eq!(page.offset, 0);
    }
}
