//! Pure three-way merge dispatch.
//!
//! [`ConflictService::merge`] reconciles base/current/new states of one
//! node's content with no I/O. JSON documents merge at key level, text
//! merges at line level, and any unmergeable combination resolves to
//! last-writer-wins: the new content is adopted verbatim and the conflict
//! is recorded in `conflict_details` for the audit trail. The writer is
//! never blocked.

pub mod json;
pub mod text;

use tracing::{debug, info};

use crate::content::NodeContent;
use crate::models::{ConflictDetails, MergeResult, MergeStatus, MergeStrategy};

/// Stateless three-way merge engine for node content.
pub struct ConflictService;

impl ConflictService {
    /// Merge `base` (the writer's checkout), `current` (live content), and
    /// `new` (the writer's proposed content).
    pub fn merge(
        node_id: &str,
        base: Option<&NodeContent>,
        current: &NodeContent,
        new: &NodeContent,
        operator_id: &str,
    ) -> MergeResult {
        // First write: nothing to reconcile against.
        let Some(base) = base else {
            debug!(node_id, "no base content, direct write");
            return clean_result(node_id, new.clone());
        };

        // Nobody touched the node since the caller's checkout.
        if base == current {
            debug!(node_id, "base matches current, direct write");
            return clean_result(node_id, new.clone());
        }

        let (merged, strategy) = match (base, current, new) {
            (NodeContent::Json(b), NodeContent::Json(c), NodeContent::Json(n)) => (
                json::merge_json(b, c, n).map(NodeContent::Json),
                MergeStrategy::JsonKey,
            ),
            (NodeContent::Text(b), NodeContent::Text(c), NodeContent::Text(n)) => (
                text::merge_text(b, c, n).map(NodeContent::Text),
                MergeStrategy::LineDiff3,
            ),
            // Content representations diverged mid-flight; no structural
            // merge is defined across variants.
            _ => (None, MergeStrategy::Lww),
        };

        match merged {
            Some(content) => {
                info!(node_id, strategy = %strategy, "three-way merge succeeded");
                MergeResult {
                    node_id: node_id.to_string(),
                    status: MergeStatus::Merged,
                    merged_content: content,
                    strategy_used: strategy,
                    conflict_details: None,
                }
            }
            None => {
                info!(node_id, operator_id, "merge failed, falling back to last-writer-wins");
                MergeResult {
                    node_id: node_id.to_string(),
                    status: MergeStatus::Lww,
                    merged_content: new.clone(),
                    strategy_used: MergeStrategy::Lww,
                    conflict_details: Some(ConflictDetails {
                        node_id: node_id.to_string(),
                        operator_id: operator_id.to_string(),
                        strategy_attempted: strategy,
                        message: "automatic merge failed; new content adopted verbatim".into(),
                    }),
                }
            }
        }
    }
}

/// A merge result for a write with nothing to reconcile.
pub(crate) fn clean_result(node_id: &str, content: NodeContent) -> MergeResult {
    MergeResult {
        node_id: node_id.to_string(),
        status: MergeStatus::Clean,
        merged_content: content,
        strategy_used: MergeStrategy::Direct,
        conflict_details: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_base_is_clean_direct() {
        let new = NodeContent::Json(json!({"a": 1}));
        let current = NodeContent::Json(json!({"other": true}));
        let result = ConflictService::merge("n1", None, &current, &new, "agent-1");
        assert_eq!(result.status, MergeStatus::Clean);
        assert_eq!(result.strategy_used, MergeStrategy::Direct);
        assert_eq!(result.merged_content, new);
    }

    #[test]
    fn test_base_equals_current_is_clean() {
        // Regardless of content type.
        let base = NodeContent::Text("hello\n".into());
        let new = NodeContent::Text("goodbye\n".into());
        let result = ConflictService::merge("n1", Some(&base), &base, &new, "agent-1");
        assert_eq!(result.status, MergeStatus::Clean);
        assert_eq!(result.merged_content, new);
    }

    #[test]
    fn test_json_key_merge() {
        let base = NodeContent::Json(json!({"a": 1}));
        let current = NodeContent::Json(json!({"a": 1, "b": 2}));
        let new = NodeContent::Json(json!({"a": 1, "c": 3}));
        let result = ConflictService::merge("n1", Some(&base), &current, &new, "agent-1");
        assert_eq!(result.status, MergeStatus::Merged);
        assert_eq!(result.strategy_used, MergeStrategy::JsonKey);
        assert_eq!(
            result.merged_content.as_json().unwrap(),
            &json!({"a": 1, "b": 2, "c": 3})
        );
    }

    #[test]
    fn test_text_line_merge() {
        let base = NodeContent::Text("a\nb\nc\nd\ne\nf\ng\nh\n".into());
        let current = NodeContent::Text("A\nb\nc\nd\ne\nf\ng\nh\n".into());
        let new = NodeContent::Text("a\nb\nc\nd\ne\nf\ng\nH\n".into());
        let result = ConflictService::merge("n1", Some(&base), &current, &new, "agent-1");
        assert_eq!(result.status, MergeStatus::Merged);
        assert_eq!(result.strategy_used, MergeStrategy::LineDiff3);
        let merged = result.merged_content.as_text().unwrap();
        assert!(merged.contains('A'));
        assert!(merged.contains('H'));
    }

    #[test]
    fn test_lww_fallback_adopts_new_verbatim() {
        let base = NodeContent::Json(json!({"a": 1}));
        let current = NodeContent::Json(json!({"a": 2}));
        let new = NodeContent::Json(json!({"a": 3}));
        let result = ConflictService::merge("n1", Some(&base), &current, &new, "agent-7");
        assert_eq!(result.status, MergeStatus::Lww);
        assert_eq!(result.strategy_used, MergeStrategy::Lww);
        assert_eq!(result.merged_content, new);

        let details = result.conflict_details.unwrap();
        assert_eq!(details.operator_id, "agent-7");
        assert_eq!(details.strategy_attempted, MergeStrategy::JsonKey);
    }

    #[test]
    fn test_mixed_variants_fall_back_to_lww() {
        let base = NodeContent::Text("x\n".into());
        let current = NodeContent::Json(json!({"a": 1}));
        let new = NodeContent::Text("y\n".into());
        let result = ConflictService::merge("n1", Some(&base), &current, &new, "agent-1");
        assert_eq!(result.status, MergeStatus::Lww);
        assert_eq!(result.merged_content, new);
    }
}
