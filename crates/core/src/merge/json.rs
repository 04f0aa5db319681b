//! Key-level three-way merge of JSON documents.
//!
//! Each side's edit set is the set of top-level keys it added, removed, or
//! modified relative to the base document. Disjoint edit sets apply cleanly
//! onto the base; overlapping keys only merge when both sides arrived at
//! the same result. Anything else is a conflict and the merge fails.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

/// A single side's edit to one key, relative to base.
#[derive(Debug, Clone, PartialEq)]
enum KeyEdit {
    Set(Value),
    Removed,
}

/// Attempt a key-level three-way merge. Returns the merged document, or
/// `None` when both sides edited the same key to different results.
///
/// Non-object documents carry no keys to merge over: they only reconcile
/// when one side left the base untouched or both sides agree.
pub fn merge_json(base: &Value, current: &Value, new: &Value) -> Option<Value> {
    let (Value::Object(base_map), Value::Object(current_map), Value::Object(new_map)) =
        (base, current, new)
    else {
        if current == new {
            return Some(new.clone());
        }
        if current == base {
            return Some(new.clone());
        }
        if new == base {
            return Some(current.clone());
        }
        debug!("non-object JSON documents diverged, no key-level merge possible");
        return None;
    };

    let current_edits = edits_against_base(base_map, current_map);
    let new_edits = edits_against_base(base_map, new_map);

    // Overlapping keys must agree on the resulting value.
    for (key, edit) in &current_edits {
        if let Some(other) = new_edits.get(key) {
            if edit != other {
                debug!(key = %key, "both sides edited the same key to different values");
                return None;
            }
        }
    }

    let mut merged = base_map.clone();
    for edits in [&current_edits, &new_edits] {
        for (key, edit) in edits {
            match edit {
                KeyEdit::Set(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                KeyEdit::Removed => {
                    merged.remove(key);
                }
            }
        }
    }

    Some(Value::Object(merged))
}

/// Keys a side added, removed, or modified relative to base.
fn edits_against_base(
    base: &serde_json::Map<String, Value>,
    side: &serde_json::Map<String, Value>,
) -> BTreeMap<String, KeyEdit> {
    let mut edits = BTreeMap::new();
    for (key, value) in side {
        if base.get(key) != Some(value) {
            edits.insert(key.clone(), KeyEdit::Set(value.clone()));
        }
    }
    for key in base.keys() {
        if !side.contains_key(key) {
            edits.insert(key.clone(), KeyEdit::Removed);
        }
    }
    edits
}
