//! The collaboration façade.
//!
//! [`CollaborationService`] ties the version gate, three-way merge, version
//! chain, and audit trail into the engine's public checkout/commit surface.
//! Concurrent writers follow one protocol: checkout a working copy, edit,
//! commit against the checked-out base version. A stale base triggers an
//! automatic three-way merge; an unmergeable edit falls back to
//! last-writer-wins with the conflict attributed in the audit trail. The
//! writer is never blocked and never loses the version they wrote, only the
//! position of it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::{actions, AuditService};
use crate::config::{EngineConfig, HistoryConfig};
use crate::content::NodeContent;
use crate::errors::{EngineError, VersionError};
use crate::lock::LockService;
use crate::merge::ConflictService;
use crate::models::{
    AuditRecord, CommitResult, ContentNode, DiffReport, FileVersion, FolderRollbackResponse,
    FolderSnapshot, MergeStatus, NodeType, Operation, OperatorType, Page, PaginatedResult,
    RollbackResponse, WorkingCopy,
};
use crate::store::sqlite::Database;
use crate::store::{AuditStore, ContentStore, SnapshotStore, VersionStore};
use crate::version::{VersionRequest, VersionService};

/// Input for [`CollaborationService::commit`].
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub node_id: String,
    pub operator_type: OperatorType,
    pub operator_id: String,
    pub session_id: Option<String>,
    /// The version the caller checked out and edited against.
    pub base_version: i64,
    /// Raw payload; parsed according to the node's type.
    pub content: String,
    pub blob_ref: Option<String>,
    pub summary: Option<String>,
}

impl CommitRequest {
    pub fn new(
        node_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
        base_version: i64,
        content: &str,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            operator_type,
            operator_id: operator_id.to_string(),
            session_id: None,
            base_version,
            content: content.to_string(),
            blob_ref: None,
            summary: None,
        }
    }
}

/// The engine's public surface.
pub struct CollaborationService {
    nodes: Arc<dyn ContentStore>,
    versions: Arc<dyn VersionStore>,
    lock: LockService,
    version: VersionService,
    audit: AuditService,
    history: HistoryConfig,
}

impl CollaborationService {
    /// Wire the service from injected stores. The audit backend is optional;
    /// without one the engine runs with auditing disabled.
    pub fn new(
        nodes: Arc<dyn ContentStore>,
        versions: Arc<dyn VersionStore>,
        snapshots: Arc<dyn SnapshotStore>,
        audit: Option<Arc<dyn AuditStore>>,
        history: HistoryConfig,
    ) -> Self {
        Self {
            lock: LockService::new(nodes.clone()),
            version: VersionService::new(nodes.clone(), versions.clone(), snapshots),
            audit: AuditService::new(audit),
            nodes,
            versions,
            history,
        }
    }

    /// Open (or create) the SQLite database under `config.data_dir` and
    /// wire every store to it, audit included.
    pub fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        let db = Arc::new(Database::open_in(&config.data_dir)?);
        db.initialize()?;
        Ok(Self::new(
            db.clone(),
            db.clone(),
            db.clone(),
            Some(db),
            config.history.clone(),
        ))
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Seed a node at version 0 with no content. The first commit
    /// materializes version 1.
    pub fn create_node(
        &self,
        project_id: &str,
        name: &str,
        node_type: NodeType,
        parent_id: Option<&str>,
    ) -> Result<ContentNode, EngineError> {
        let mut node = ContentNode::new(project_id, name, node_type);
        if let Some(parent) = parent_id {
            node = node.with_parent(parent);
        }
        self.nodes.insert_node(&node).map_err(EngineError::Store)?;
        info!(node_id = %node.id, name, node_type = %node_type, "created node");
        Ok(node)
    }

    pub fn get_node(&self, node_id: &str) -> Result<Option<ContentNode>, EngineError> {
        self.nodes.get_node(node_id).map_err(EngineError::Store)
    }

    // -----------------------------------------------------------------------
    // Checkout / commit
    // -----------------------------------------------------------------------

    /// Take a working copy of a node's live state. Returns `None` when the
    /// node does not exist.
    pub fn checkout(
        &self,
        node_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
    ) -> Result<Option<WorkingCopy>, EngineError> {
        let Some(node) = self.nodes.get_node(node_id).map_err(EngineError::Store)? else {
            return Ok(None);
        };
        self.audit.log_checkout(node_id, operator_type, operator_id);
        Ok(Some(WorkingCopy {
            node_id: node.id,
            node_type: node.node_type,
            content: node.content,
            base_version: node.current_version,
            content_hash: node.content_hash,
        }))
    }

    /// Checkout several nodes at once. Missing nodes are skipped.
    pub fn checkout_batch(
        &self,
        node_ids: &[String],
        operator_type: OperatorType,
        operator_id: &str,
    ) -> Result<Vec<WorkingCopy>, EngineError> {
        let mut copies = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            if let Some(copy) = self.checkout(node_id, operator_type, operator_id)? {
                copies.push(copy);
            }
        }
        Ok(copies)
    }

    /// Commit a writer's edit against their checked-out base version.
    ///
    /// A matching base version writes directly. A stale base triggers a
    /// three-way merge between the base version's content, the live
    /// content, and the incoming edit; when the merge cannot complete the
    /// incoming edit wins verbatim and the conflict is audited. A commit
    /// whose content hash equals the live hash is a no-op and reports the
    /// live version unchanged.
    pub fn commit(&self, req: CommitRequest) -> Result<CommitResult, EngineError> {
        let node = self
            .nodes
            .get_node(&req.node_id)
            .map_err(EngineError::Store)?
            .ok_or_else(|| VersionError::NodeNotFound(req.node_id.clone()))?;

        // Parse per declared node type; an unparseable payload on a JSON
        // node is stored as text rather than rejected, so a writer's work
        // is never dropped on the floor.
        let (new_content, node_type_override) =
            match NodeContent::parse(&node.node_type, &req.content) {
                Some(content) => (content, None),
                None => {
                    warn!(
                        node_id = %req.node_id,
                        operator_id = %req.operator_id,
                        "json payload failed to parse, downgrading node to text storage"
                    );
                    self.audit.log_event(
                        actions::CONTENT_DOWNGRADED,
                        &req.node_id,
                        req.operator_type,
                        &req.operator_id,
                        serde_json::json!({ "from": node.node_type.to_string() }),
                    );
                    (
                        NodeContent::Text(req.content.clone()),
                        Some(NodeType::Markdown),
                    )
                }
            };

        let base_matches = self
            .lock
            .check_version(&req.node_id, req.base_version)
            .map_err(EngineError::Store)?;

        let merge = if base_matches || node.content.is_none() {
            crate::merge::clean_result(&req.node_id, new_content)
        } else {
            let base_content = self
                .versions
                .get_by_node_and_version(&req.node_id, req.base_version)
                .map_err(EngineError::Store)?
                .and_then(|v| v.content);
            let current = node.content.as_ref().unwrap_or(&new_content);
            ConflictService::merge(
                &req.node_id,
                base_content.as_ref(),
                current,
                &new_content,
                &req.operator_id,
            )
        };

        let old_version = node.current_version;
        let created = self.version.create_version(VersionRequest {
            node_id: req.node_id.clone(),
            operator_type: req.operator_type,
            operator_id: req.operator_id.clone(),
            session_id: req.session_id.clone(),
            operation: Operation::Update,
            content: Some(merge.merged_content.clone()),
            blob_ref: req.blob_ref.clone(),
            node_type: node_type_override,
            merge_strategy: Some(merge.strategy_used),
            summary: req.summary.clone(),
            size_bytes: None,
        })?;

        let version = match created {
            Some(ref fv) => fv.version,
            // Identical content; the live version stands.
            None => old_version,
        };

        // Audited even when no version was minted: the writer acted, and
        // old_version == version marks the no-op in the trail.
        self.audit.log_commit(
            &req.node_id,
            req.operator_type,
            &req.operator_id,
            old_version,
            version,
            merge.status,
            Some(merge.strategy_used),
        );
        // Any non-clean commit found concurrent divergence and gets a
        // conflict entry, reconciled merges included.
        if merge.status != MergeStatus::Clean {
            self.audit.log_conflict(
                &req.node_id,
                req.operator_type,
                &req.operator_id,
                merge.status,
                Some(merge.strategy_used),
                merge.conflict_details.as_ref(),
                old_version,
                version,
            );
        }

        Ok(CommitResult {
            node_id: req.node_id,
            status: merge.status,
            version,
            final_content: merge.merged_content,
            strategy: merge.strategy_used,
            conflict_details: merge.conflict_details,
        })
    }

    /// Record a delete as a version. Deletes always append to history, even
    /// when the content hash is unchanged.
    pub fn delete_node(
        &self,
        node_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
    ) -> Result<FileVersion, EngineError> {
        let node = self
            .nodes
            .get_node(node_id)
            .map_err(EngineError::Store)?
            .ok_or_else(|| VersionError::NodeNotFound(node_id.to_string()))?;
        let old_version = node.current_version;

        let created = self.version.record_delete(VersionRequest {
            node_id: node_id.to_string(),
            operator_type,
            operator_id: operator_id.to_string(),
            session_id: None,
            operation: Operation::Delete,
            content: node.content,
            blob_ref: node.blob_ref,
            node_type: None,
            merge_strategy: None,
            summary: Some("delete".to_string()),
            size_bytes: None,
        })?;

        self.audit.log_event(
            "delete",
            node_id,
            operator_type,
            operator_id,
            serde_json::json!({ "old_version": old_version, "new_version": created.version }),
        );
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Rollback and snapshots
    // -----------------------------------------------------------------------

    pub fn rollback_file(
        &self,
        node_id: &str,
        target_version: i64,
        operator_type: OperatorType,
        operator_id: &str,
    ) -> Result<RollbackResponse, EngineError> {
        let response = self
            .version
            .rollback_file(node_id, target_version, operator_type, operator_id)?;
        self.audit.log_rollback(
            node_id,
            operator_type,
            operator_id,
            response.rolled_back_to,
            response.new_version,
        );
        Ok(response)
    }

    pub fn rollback_folder(
        &self,
        folder_node_id: &str,
        target_snapshot_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
    ) -> Result<FolderRollbackResponse, EngineError> {
        let response = self.version.rollback_folder(
            folder_node_id,
            target_snapshot_id,
            operator_type,
            operator_id,
        )?;
        self.audit.log_folder_rollback(
            folder_node_id,
            operator_type,
            operator_id,
            target_snapshot_id,
            &response.new_snapshot_id,
            response.rolled_back.len(),
        );
        Ok(response)
    }

    pub fn create_folder_snapshot(
        &self,
        folder_node_id: &str,
        changed_node_ids: &[String],
        operator_type: OperatorType,
        operator_id: &str,
    ) -> Result<FolderSnapshot, EngineError> {
        Ok(self.version.create_folder_snapshot(
            folder_node_id,
            changed_node_ids,
            operator_type,
            operator_id,
            "snapshot",
            None,
        )?)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Paged version history, newest first. `None` uses the configured
    /// default page; oversized limits are capped.
    pub fn get_version_history(
        &self,
        node_id: &str,
        page: Option<Page>,
    ) -> Result<PaginatedResult<FileVersion>, EngineError> {
        let page = self.history.clamp(page.unwrap_or_default());
        Ok(self.version.get_version_history(node_id, page)?)
    }

    pub fn get_version_content(
        &self,
        node_id: &str,
        version: i64,
    ) -> Result<FileVersion, EngineError> {
        Ok(self.version.get_version_content(node_id, version)?)
    }

    pub fn get_snapshot_history(
        &self,
        folder_node_id: &str,
        page: Option<Page>,
    ) -> Result<PaginatedResult<FolderSnapshot>, EngineError> {
        let page = self.history.clamp(page.unwrap_or_default());
        Ok(self.version.get_snapshot_history(folder_node_id, page)?)
    }

    pub fn compute_diff(
        &self,
        node_id: &str,
        from_version: i64,
        to_version: i64,
    ) -> Result<DiffReport, EngineError> {
        Ok(self.version.compute_diff(node_id, from_version, to_version)?)
    }

    // -----------------------------------------------------------------------
    // Audit reads
    // -----------------------------------------------------------------------

    pub fn audit_recent(&self, limit: u32) -> Result<Vec<AuditRecord>, EngineError> {
        Ok(self.audit.recent(limit)?)
    }

    pub fn audit_for_action(
        &self,
        action: &str,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, EngineError> {
        Ok(self.audit.for_action(action, limit)?)
    }
}
