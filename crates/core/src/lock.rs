//! Optimistic-concurrency gate.
//!
//! There is no lock to acquire. [`LockService`] only answers one question:
//! is the caller's base version still the node's live version? True means
//! the write may proceed directly; false routes the commit through the
//! merge path. Either way the final arbiter is the conditional update in
//! the version service.

use std::sync::Arc;

use tracing::debug;

use crate::content::NodeContent;
use crate::errors::StoreError;
use crate::store::ContentStore;

/// Single version comparison over the live node state.
pub struct LockService {
    nodes: Arc<dyn ContentStore>,
}

impl LockService {
    pub fn new(nodes: Arc<dyn ContentStore>) -> Self {
        Self { nodes }
    }

    /// Compare `expected_version` to the node's live `current_version`.
    /// An absent node reads as version 0, so first writes against a
    /// not-yet-materialized node pass the gate.
    pub fn check_version(&self, node_id: &str, expected_version: i64) -> Result<bool, StoreError> {
        let live = self.current_version(node_id)?;
        let matches = live == expected_version;
        debug!(node_id, expected_version, live, matches, "version check");
        Ok(matches)
    }

    /// The node's live version, 0 if the node does not exist.
    pub fn current_version(&self, node_id: &str) -> Result<i64, StoreError> {
        Ok(self
            .nodes
            .get_node(node_id)?
            .map(|node| node.current_version)
            .unwrap_or(0))
    }

    /// The node's live content, if any.
    pub fn current_content(&self, node_id: &str) -> Result<Option<NodeContent>, StoreError> {
        Ok(self.nodes.get_node(node_id)?.and_then(|node| node.content))
    }

    /// The node's live content in canonical string form.
    pub fn current_content_string(&self, node_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .current_content(node_id)?
            .map(|content| content.canonical_string()))
    }
}
