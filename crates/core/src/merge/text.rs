//! Line-level three-way text merge.
//!
//! Uses the `diffy` crate: build a patch from base to each side, then try
//! applying each side's patch to the other side's content. Either direction
//! succeeding yields a clean merge. Both failing means the edits overlap,
//! and instead of emitting conflict markers the engine reports no merge so
//! the caller can fall back to last-writer-wins.

use tracing::debug;

/// Attempt a three-way merge of `base`, `current`, and `new` text.
///
/// Returns the merged text, or `None` when the changed line ranges overlap
/// and cannot be reconciled automatically.
pub fn merge_text(base: &str, current: &str, new: &str) -> Option<String> {
    // Fast path: both sides made the exact same change.
    if current == new {
        debug!("current == new, identical changes");
        return Some(new.to_string());
    }
    // Fast path: only one side changed.
    if current == base {
        debug!("current == base, new wins cleanly");
        return Some(new.to_string());
    }
    if new == base {
        debug!("new == base, current wins cleanly");
        return Some(current.to_string());
    }

    // Try applying the new-side patch on top of the current content.
    let patch_new = diffy::create_patch(base, new);
    if let Ok(merged) = diffy::apply(current, &patch_new) {
        debug!("clean merge via applying new-patch to current");
        return Some(merged);
    }

    // Try the reverse: apply the current-side patch to the new content.
    let patch_current = diffy::create_patch(base, current);
    if let Ok(merged) = diffy::apply(new, &patch_current) {
        debug!("clean merge via applying current-patch to new");
        return Some(merged);
    }

    debug!("automatic text merge failed, line ranges overlap");
    None
}
