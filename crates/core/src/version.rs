//! Atomic version creation, rollback, folder snapshots, and diff.
//!
//! [`VersionService`] owns every write to a node's version chain. The chain
//! is serialized per node by a single compare-and-swap at the storage
//! boundary: the version number for a new entry is computed from the node
//! state read *before* any write, and the node update is conditioned on
//! that same version. When the conditional update matches zero rows the
//! service raises [`VersionError::VersionConflict`] and deliberately leaves
//! the already-inserted history row in place as an orphan entry; the caller
//! retries the full checkout -> commit sequence.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::content::{hash_str, NodeContent};
use crate::errors::VersionError;
use crate::models::{
    ContentNode, DiffEntry, DiffKind, DiffReport, FileVersion, FolderRollbackResponse,
    FolderSnapshot, MergeStrategy, NodeType, Operation, OperatorType, Page, PaginatedResult,
    RollbackResponse,
};
use crate::store::{ContentStore, SnapshotStore, VersionStore};

/// Input for [`VersionService::create_version`].
#[derive(Debug, Clone)]
pub struct VersionRequest {
    pub node_id: String,
    pub operator_type: OperatorType,
    pub operator_id: String,
    pub session_id: Option<String>,
    pub operation: Operation,
    pub content: Option<NodeContent>,
    pub blob_ref: Option<String>,
    /// Declared node type for this write; `None` keeps the stored type.
    pub node_type: Option<NodeType>,
    pub merge_strategy: Option<MergeStrategy>,
    pub summary: Option<String>,
    /// Size to record for this version. `None` measures `content`; blob
    /// writes must supply the stored blob's size since only the reference
    /// string passes through the engine.
    pub size_bytes: Option<i64>,
}

impl VersionRequest {
    /// A plain content update by `operator`.
    pub fn update(
        node_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
        content: NodeContent,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            operator_type,
            operator_id: operator_id.to_string(),
            session_id: None,
            operation: Operation::Update,
            content: Some(content),
            blob_ref: None,
            node_type: None,
            merge_strategy: Some(MergeStrategy::Direct),
            summary: None,
            size_bytes: None,
        }
    }
}

/// Version-chain writer and history reader.
pub struct VersionService {
    nodes: Arc<dyn ContentStore>,
    versions: Arc<dyn VersionStore>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl VersionService {
    pub fn new(
        nodes: Arc<dyn ContentStore>,
        versions: Arc<dyn VersionStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            nodes,
            versions,
            snapshots,
        }
    }

    // -----------------------------------------------------------------------
    // Version creation
    // -----------------------------------------------------------------------

    /// Create the next immutable version of a node.
    ///
    /// Returns `Ok(None)` when the content hash is unchanged and the
    /// operation is not a delete: identical re-commits are idempotent and
    /// never duplicate history.
    pub fn create_version(
        &self,
        req: VersionRequest,
    ) -> Result<Option<FileVersion>, VersionError> {
        let node = self.load_node(&req.node_id)?;
        let content_hash = request_hash(&req);

        if req.operation != Operation::Delete
            && node.content_hash.as_deref() == Some(content_hash.as_str())
        {
            debug!(node_id = %req.node_id, "content hash unchanged, skipping version");
            return Ok(None);
        }

        self.mint_version(req, &node, content_hash).map(Some)
    }

    /// Record a delete as a new version. Deletes skip the unchanged-hash
    /// check entirely, so one is always minted.
    pub fn record_delete(&self, mut req: VersionRequest) -> Result<FileVersion, VersionError> {
        req.operation = Operation::Delete;
        let node = self.load_node(&req.node_id)?;
        let content_hash = request_hash(&req);
        self.mint_version(req, &node, content_hash)
    }

    fn load_node(&self, node_id: &str) -> Result<ContentNode, VersionError> {
        self.nodes
            .get_node(node_id)?
            .ok_or_else(|| VersionError::NodeNotFound(node_id.to_string()))
    }

    fn mint_version(
        &self,
        req: VersionRequest,
        node: &ContentNode,
        content_hash: String,
    ) -> Result<FileVersion, VersionError> {
        // CAS anchor: the version read before any write below.
        let expected_version = node.current_version;
        let new_version = expected_version + 1;

        // Blob dedup: a prior version with this hash already references a
        // stored blob, reuse that reference.
        let blob_ref = match &req.blob_ref {
            Some(new_ref) => match self.versions.find_by_hash(&req.node_id, &content_hash)? {
                Some(prior) if prior.blob_ref.is_some() => {
                    debug!(node_id = %req.node_id, "reusing deduplicated blob reference");
                    prior.blob_ref
                }
                _ => Some(new_ref.clone()),
            },
            None => None,
        };

        let size_bytes = req
            .size_bytes
            .unwrap_or_else(|| req.content.as_ref().map(|c| c.size_bytes()).unwrap_or(0));
        let file_version = FileVersion {
            id: uuid::Uuid::new_v4().to_string(),
            node_id: req.node_id.clone(),
            version: new_version,
            content: req.content.clone(),
            blob_ref,
            content_hash: content_hash.clone(),
            size_bytes,
            operator_type: req.operator_type,
            operator_id: req.operator_id.clone(),
            session_id: req.session_id.clone(),
            operation: req.operation,
            merge_strategy: req.merge_strategy,
            summary: req.summary.clone(),
            snapshot_id: None,
            created_at: Utc::now(),
        };
        self.versions.insert_version(&file_version)?;

        let node_type = req.node_type.unwrap_or(node.node_type);
        let updated = self.nodes.update_node(
            &req.node_id,
            node_type,
            file_version.content.as_ref(),
            file_version.blob_ref.as_deref(),
            &content_hash,
            new_version,
            expected_version,
        )?;

        if updated.is_none() {
            // Another writer bumped the version between our read and this
            // update. The history row at `new_version` stays as an accepted
            // orphan entry; compensating deletes would race the winner.
            warn!(
                node_id = %req.node_id,
                expected_version,
                orphaned_version = new_version,
                "version conflict, caller must retry checkout -> commit"
            );
            return Err(VersionError::VersionConflict {
                node_id: req.node_id,
                expected_version,
            });
        }

        info!(
            node_id = %file_version.node_id,
            version = new_version,
            operation = %file_version.operation,
            "created version"
        );
        Ok(file_version)
    }

    // -----------------------------------------------------------------------
    // Rollback
    // -----------------------------------------------------------------------

    /// Re-apply a historical version's content as a brand-new version.
    /// Version numbers never decrease.
    pub fn rollback_file(
        &self,
        node_id: &str,
        target_version: i64,
        operator_type: OperatorType,
        operator_id: &str,
    ) -> Result<RollbackResponse, VersionError> {
        let node = self
            .nodes
            .get_node(node_id)?
            .ok_or_else(|| VersionError::NodeNotFound(node_id.to_string()))?;
        let target = self
            .versions
            .get_by_node_and_version(node_id, target_version)?
            .ok_or(VersionError::VersionNotFound {
                node_id: node_id.to_string(),
                version: target_version,
            })?;

        if node.content_hash.as_deref() == Some(target.content_hash.as_str()) {
            return Err(VersionError::AlreadyAtTarget {
                node_id: node_id.to_string(),
                version: target_version,
            });
        }

        info!(node_id, target_version, "rolling back node");
        let node_type = target.content.as_ref().map(|c| c.natural_type());
        let created = self.create_version(VersionRequest {
            node_id: node_id.to_string(),
            operator_type,
            operator_id: operator_id.to_string(),
            session_id: None,
            operation: Operation::Rollback,
            content: target.content.clone(),
            blob_ref: target.blob_ref.clone(),
            node_type,
            merge_strategy: None,
            summary: Some(format!("rollback to version {target_version}")),
            size_bytes: Some(target.size_bytes),
        })?;

        // The hash check above makes a skip impossible short of a racing
        // writer landing the identical content; treat that as at-target.
        let file_version = created.ok_or(VersionError::AlreadyAtTarget {
            node_id: node_id.to_string(),
            version: target_version,
        })?;

        Ok(RollbackResponse {
            node_id: node_id.to_string(),
            rolled_back_to: target_version,
            new_version: file_version.version,
            content_hash: file_version.content_hash,
        })
    }

    /// Restore every member of a folder to the versions captured in a
    /// snapshot. Only members whose current version differs are touched;
    /// a rollback that would touch nothing is rejected.
    pub fn rollback_folder(
        &self,
        folder_node_id: &str,
        target_snapshot_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
    ) -> Result<FolderRollbackResponse, VersionError> {
        self.require_folder(folder_node_id)?;
        let snapshot = self
            .snapshots
            .get_snapshot(target_snapshot_id)?
            .ok_or_else(|| VersionError::SnapshotNotFound(target_snapshot_id.to_string()))?;
        if snapshot.folder_node_id != folder_node_id {
            return Err(VersionError::SnapshotMismatch {
                snapshot_id: target_snapshot_id.to_string(),
                folder_node_id: folder_node_id.to_string(),
            });
        }

        let mut rolled_back = Vec::new();
        let mut unchanged: u64 = 0;
        for (member_id, target_version) in &snapshot.file_versions {
            let Some(member) = self.nodes.get_node(member_id)? else {
                warn!(member_id = %member_id, "snapshot member no longer exists, skipping");
                continue;
            };
            if member.current_version == *target_version {
                unchanged += 1;
                continue;
            }
            match self.rollback_file(member_id, *target_version, operator_type, operator_id) {
                Ok(response) => rolled_back.push(response),
                // Version differs but content already matches (e.g. manually
                // reverted); no redundant version bump.
                Err(VersionError::AlreadyAtTarget { .. }) => unchanged += 1,
                Err(e) => return Err(e),
            }
        }

        if rolled_back.is_empty() {
            return Err(VersionError::NothingToRollback(folder_node_id.to_string()));
        }

        let changed_ids: Vec<String> = rolled_back.iter().map(|r| r.node_id.clone()).collect();
        let new_snapshot = self.create_folder_snapshot(
            folder_node_id,
            &changed_ids,
            operator_type,
            operator_id,
            "rollback",
            Some(target_snapshot_id),
        )?;

        info!(
            folder_node_id,
            target_snapshot_id,
            restored = rolled_back.len(),
            unchanged,
            "folder rollback complete"
        );
        Ok(FolderRollbackResponse {
            folder_node_id: folder_node_id.to_string(),
            target_snapshot_id: target_snapshot_id.to_string(),
            new_snapshot_id: new_snapshot.id,
            rolled_back,
            unchanged,
        })
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Capture the current version of every non-folder descendant into an
    /// immutable snapshot, and back-link the contributing version rows.
    pub fn create_folder_snapshot(
        &self,
        folder_node_id: &str,
        changed_node_ids: &[String],
        operator_type: OperatorType,
        operator_id: &str,
        operation: &str,
        base_snapshot_id: Option<&str>,
    ) -> Result<FolderSnapshot, VersionError> {
        self.require_folder(folder_node_id)?;

        let members: Vec<_> = self
            .nodes
            .list_descendants(folder_node_id)?
            .into_iter()
            .filter(|node| node.node_type != NodeType::Folder)
            .collect();

        let file_versions: std::collections::BTreeMap<String, i64> = members
            .iter()
            .map(|node| (node.id.clone(), node.current_version))
            .collect();
        let changed_files: Vec<String> = changed_node_ids
            .iter()
            .filter(|id| file_versions.contains_key(*id))
            .cloned()
            .collect();

        let snapshot = FolderSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            folder_node_id: folder_node_id.to_string(),
            files_count: file_versions.len() as i64,
            changed_count: changed_files.len() as i64,
            file_versions,
            changed_files: changed_files.clone(),
            operator_type,
            operator_id: operator_id.to_string(),
            operation: operation.to_string(),
            base_snapshot_id: base_snapshot_id.map(|s| s.to_string()),
            created_at: Utc::now(),
        };
        self.snapshots.insert_snapshot(&snapshot)?;

        let backlinks: Vec<(String, i64)> = changed_files
            .iter()
            .filter_map(|id| {
                snapshot
                    .file_versions
                    .get(id)
                    .filter(|v| **v > 0)
                    .map(|v| (id.clone(), *v))
            })
            .collect();
        if !backlinks.is_empty() {
            self.versions.bulk_update_snapshot_id(&backlinks, &snapshot.id)?;
        }

        info!(
            folder_node_id,
            snapshot_id = %snapshot.id,
            files = snapshot.files_count,
            changed = snapshot.changed_count,
            "created folder snapshot"
        );
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // History reads
    // -----------------------------------------------------------------------

    /// Newest-first page of a node's version history.
    pub fn get_version_history(
        &self,
        node_id: &str,
        page: Page,
    ) -> Result<PaginatedResult<FileVersion>, VersionError> {
        self.nodes
            .get_node(node_id)?
            .ok_or_else(|| VersionError::NodeNotFound(node_id.to_string()))?;
        let items = self.versions.list_by_node(node_id, page.limit, page.offset)?;
        let total = self.versions.count_by_node(node_id)? as u64;
        Ok(PaginatedResult {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// One historical version, in full.
    pub fn get_version_content(
        &self,
        node_id: &str,
        version: i64,
    ) -> Result<FileVersion, VersionError> {
        self.versions
            .get_by_node_and_version(node_id, version)?
            .ok_or(VersionError::VersionNotFound {
                node_id: node_id.to_string(),
                version,
            })
    }

    /// Newest-first page of a folder's snapshots.
    pub fn get_snapshot_history(
        &self,
        folder_node_id: &str,
        page: Page,
    ) -> Result<PaginatedResult<FolderSnapshot>, VersionError> {
        self.require_folder(folder_node_id)?;
        let items = self
            .snapshots
            .list_by_folder(folder_node_id, page.limit, page.offset)?;
        let total = self.snapshots.count_by_folder(folder_node_id)? as u64;
        Ok(PaginatedResult {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    // -----------------------------------------------------------------------
    // Diff
    // -----------------------------------------------------------------------

    /// Compare two historical versions. JSON payloads get a recursive
    /// key-path diff; text and blob payloads compare by size only.
    pub fn compute_diff(
        &self,
        node_id: &str,
        from_version: i64,
        to_version: i64,
    ) -> Result<DiffReport, VersionError> {
        let from = self.get_version_content(node_id, from_version)?;
        let to = self.get_version_content(node_id, to_version)?;

        let entries = match (&from.content, &to.content) {
            (Some(NodeContent::Json(a)), Some(NodeContent::Json(b))) => {
                let mut entries = Vec::new();
                diff_values("$", Some(a), Some(b), &mut entries);
                entries
            }
            _ => Vec::new(),
        };

        Ok(DiffReport {
            node_id: node_id.to_string(),
            from_version,
            to_version,
            entries,
            size_delta: to.size_bytes - from.size_bytes,
        })
    }

    fn require_folder(&self, folder_node_id: &str) -> Result<(), VersionError> {
        let folder = self
            .nodes
            .get_node(folder_node_id)?
            .ok_or_else(|| VersionError::NodeNotFound(folder_node_id.to_string()))?;
        if folder.node_type != NodeType::Folder {
            return Err(VersionError::NotAFolder(folder_node_id.to_string()));
        }
        Ok(())
    }
}

fn request_hash(req: &VersionRequest) -> String {
    match (&req.content, &req.blob_ref) {
        (Some(content), _) => content.content_hash(),
        // Binary nodes: only the reference string is hashed; byte
        // transfer lives outside this engine.
        (None, Some(blob_ref)) => hash_str(blob_ref),
        (None, None) => hash_str(""),
    }
}

/// Recursive key-path walk. Objects recurse over the sorted union of their
/// keys; everything else is compared atomically. Key order is
/// deterministic, so the emitted entries are too.
fn diff_values(
    path: &str,
    before: Option<&Value>,
    after: Option<&Value>,
    out: &mut Vec<DiffEntry>,
) {
    match (before, after) {
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let child_path = if path == "$" {
                    key.to_string()
                } else {
                    format!("{path}.{key}")
                };
                diff_values(&child_path, a.get(key.as_str()), b.get(key.as_str()), out);
            }
        }
        (Some(a), Some(b)) => {
            if a != b {
                out.push(DiffEntry {
                    path: path.to_string(),
                    kind: DiffKind::Changed,
                    before: Some(a.clone()),
                    after: Some(b.clone()),
                });
            }
        }
        (Some(a), None) => out.push(DiffEntry {
            path: path.to_string(),
            kind: DiffKind::Removed,
            before: Some(a.clone()),
            after: None,
        }),
        (None, Some(b)) => out.push(DiffEntry {
            path: path.to_string(),
            kind: DiffKind::Added,
            before: None,
            after: Some(b.clone()),
        }),
        (None, None) => {}
    }
}
