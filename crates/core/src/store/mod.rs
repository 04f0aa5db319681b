//! Repository contracts and the SQLite reference backend.
//!
//! The engine's services never touch storage directly; they go through the
//! traits defined here, injected as `Arc<dyn _>` at construction time. The
//! bundled SQLite backend ([`sqlite::Database`]) implements all four traits
//! and is what [`crate::collab::CollaborationService::open`] wires up.

pub mod sqlite;

use crate::content::NodeContent;
use crate::errors::StoreError;
use crate::models::{AuditRecord, ContentNode, FileVersion, FolderSnapshot, NodeType};

/// Storage for live content nodes.
///
/// `update_node` is the engine's only write path to a node and must be an
/// atomic conditional update: the implementation applies the change solely
/// where the stored `current_version` equals `expected_version`, and
/// returns `None` when no row matched. That zero-row signal is the entire
/// optimistic-concurrency mechanism; there is no in-process lock.
pub trait ContentStore: Send + Sync {
    fn get_node(&self, node_id: &str) -> Result<Option<ContentNode>, StoreError>;

    fn insert_node(&self, node: &ContentNode) -> Result<(), StoreError>;

    /// Conditionally update a node's content, type, hash and version.
    /// Returns the updated node, or `None` if the CAS guard failed.
    #[allow(clippy::too_many_arguments)]
    fn update_node(
        &self,
        node_id: &str,
        node_type: NodeType,
        content: Option<&NodeContent>,
        blob_ref: Option<&str>,
        content_hash: &str,
        new_version: i64,
        expected_version: i64,
    ) -> Result<Option<ContentNode>, StoreError>;

    /// Every node transitively under `folder_node_id`, folders included.
    fn list_descendants(&self, folder_node_id: &str) -> Result<Vec<ContentNode>, StoreError>;
}

/// Append-only storage for the immutable version history.
pub trait VersionStore: Send + Sync {
    fn insert_version(&self, version: &FileVersion) -> Result<(), StoreError>;

    fn get_by_node_and_version(
        &self,
        node_id: &str,
        version: i64,
    ) -> Result<Option<FileVersion>, StoreError>;

    /// Newest-first window of a node's history.
    fn list_by_node(
        &self,
        node_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<FileVersion>, StoreError>;

    fn count_by_node(&self, node_id: &str) -> Result<i64, StoreError>;

    /// Most recent version of the node carrying this content hash.
    fn find_by_hash(
        &self,
        node_id: &str,
        content_hash: &str,
    ) -> Result<Option<FileVersion>, StoreError>;

    fn latest_by_node(&self, node_id: &str) -> Result<Option<FileVersion>, StoreError>;

    /// Back-link the given `(node_id, version)` rows to a snapshot.
    /// Returns the number of rows updated.
    fn bulk_update_snapshot_id(
        &self,
        members: &[(String, i64)],
        snapshot_id: &str,
    ) -> Result<u64, StoreError>;
}

/// Storage for immutable folder snapshots.
pub trait SnapshotStore: Send + Sync {
    fn insert_snapshot(&self, snapshot: &FolderSnapshot) -> Result<(), StoreError>;

    fn get_snapshot(&self, snapshot_id: &str) -> Result<Option<FolderSnapshot>, StoreError>;

    /// Newest-first window of a folder's snapshots.
    fn list_by_folder(
        &self,
        folder_node_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<FolderSnapshot>, StoreError>;

    fn count_by_folder(&self, folder_node_id: &str) -> Result<i64, StoreError>;
}

/// Best-effort audit sink. Callers swallow errors from this trait; an
/// implementation may fail freely without affecting the primary write path.
pub trait AuditStore: Send + Sync {
    /// Insert one audit row, returning its assigned id.
    fn insert_entry(&self, record: &AuditRecord) -> Result<i64, StoreError>;

    /// Most recent entries, newest first.
    fn recent_entries(&self, limit: u32) -> Result<Vec<AuditRecord>, StoreError>;

    /// Most recent entries for one action, newest first.
    fn entries_for_action(&self, action: &str, limit: u32)
        -> Result<Vec<AuditRecord>, StoreError>;
}
