//! Best-effort audit trail.
//!
//! Every checkout, commit, rollback, and conflict is recorded when an audit
//! backend is configured. Audit failures never propagate: a broken sink must
//! not block the primary write path, so [`AuditService::record`] logs the
//! failure and returns. Reads go through [`AuditService::recent`] and
//! [`AuditService::for_action`], which do surface store errors.

use std::sync::Arc;

use tracing::warn;

use crate::errors::StoreError;
use crate::models::{AuditRecord, ConflictDetails, MergeStatus, MergeStrategy, OperatorType};
use crate::store::AuditStore;

/// Audit actions written by the engine.
pub mod actions {
    pub const CHECKOUT: &str = "checkout";
    pub const COMMIT: &str = "commit";
    pub const ROLLBACK: &str = "rollback";
    pub const FOLDER_ROLLBACK: &str = "folder_rollback";
    pub const CONFLICT: &str = "conflict";
    pub const CONTENT_DOWNGRADED: &str = "content_downgraded";
}

/// Records engine activity into an optional [`AuditStore`].
pub struct AuditService {
    backend: Option<Arc<dyn AuditStore>>,
}

impl AuditService {
    pub fn new(backend: Option<Arc<dyn AuditStore>>) -> Self {
        Self { backend }
    }

    /// A service that records nothing.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Write one record. Failures are logged and dropped.
    pub fn record(&self, record: AuditRecord) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.insert_entry(&record) {
            warn!(
                action = %record.action,
                node_id = %record.node_id,
                error = %e,
                "failed to write audit entry"
            );
        }
    }

    pub fn log_checkout(&self, node_id: &str, operator_type: OperatorType, operator_id: &str) {
        self.record(AuditRecord::new(
            actions::CHECKOUT,
            node_id,
            operator_type,
            operator_id,
        ));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_commit(
        &self,
        node_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
        old_version: i64,
        new_version: i64,
        status: MergeStatus,
        strategy: Option<MergeStrategy>,
    ) {
        let mut record = AuditRecord::new(actions::COMMIT, node_id, operator_type, operator_id);
        record.old_version = Some(old_version);
        record.new_version = Some(new_version);
        record.status = Some(status.to_string());
        record.strategy = strategy.map(|s| s.to_string());
        self.record(record);
    }

    pub fn log_rollback(
        &self,
        node_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
        rolled_back_to: i64,
        new_version: i64,
    ) {
        let mut record = AuditRecord::new(actions::ROLLBACK, node_id, operator_type, operator_id);
        record.old_version = Some(rolled_back_to);
        record.new_version = Some(new_version);
        self.record(record);
    }

    pub fn log_folder_rollback(
        &self,
        folder_node_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
        target_snapshot_id: &str,
        new_snapshot_id: &str,
        restored: usize,
    ) {
        let mut record = AuditRecord::new(
            actions::FOLDER_ROLLBACK,
            folder_node_id,
            operator_type,
            operator_id,
        );
        record.metadata = serde_json::to_string(&serde_json::json!({
            "target_snapshot_id": target_snapshot_id,
            "new_snapshot_id": new_snapshot_id,
            "restored": restored,
        }))
        .ok();
        self.record(record);
    }

    /// A commit that found concurrent divergence, whether the merge
    /// reconciled it or fell through to last-writer-wins. `details` is
    /// carried only for the last-writer-wins case.
    #[allow(clippy::too_many_arguments)]
    pub fn log_conflict(
        &self,
        node_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
        status: MergeStatus,
        strategy: Option<MergeStrategy>,
        details: Option<&ConflictDetails>,
        old_version: i64,
        new_version: i64,
    ) {
        let mut record = AuditRecord::new(actions::CONFLICT, node_id, operator_type, operator_id);
        record.old_version = Some(old_version);
        record.new_version = Some(new_version);
        record.status = Some(status.to_string());
        record.strategy = strategy.map(|s| s.to_string());
        record.conflict_details = details.and_then(|d| serde_json::to_string(d).ok());
        self.record(record);
    }

    /// Free-form engine event with JSON metadata.
    pub fn log_event(
        &self,
        action: &str,
        node_id: &str,
        operator_type: OperatorType,
        operator_id: &str,
        metadata: serde_json::Value,
    ) {
        let mut record = AuditRecord::new(action, node_id, operator_type, operator_id);
        record.metadata = serde_json::to_string(&metadata).ok();
        self.record(record);
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<AuditRecord>, StoreError> {
        match &self.backend {
            Some(backend) => backend.recent_entries(limit),
            None => Ok(Vec::new()),
        }
    }

    /// Most recent entries for one action, newest first.
    pub fn for_action(&self, action: &str, limit: u32) -> Result<Vec<AuditRecord>, StoreError> {
        match &self.backend {
            Some(backend) => backend.entries_for_action(action, limit),
            None => Ok(Vec::new()),
        }
    }
}
