//! Typed node content and content hashing.
//!
//! A content node stores either a JSON document or plain text (Markdown).
//! [`NodeContent`] is the closed tagged representation both the merge engine
//! and the version store dispatch on, replacing ad hoc branching on a type
//! string. The canonical string form (JSON with recursively sorted keys,
//! text verbatim) is what gets hashed and persisted, so two semantically
//! identical JSON documents always produce the same SHA-256.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::NodeType;

/// Content payload of a node or version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NodeContent {
    /// A structured JSON document.
    Json(Value),
    /// Plain text / Markdown.
    Text(String),
}

impl NodeContent {
    /// Parse raw string content according to the node's declared type.
    ///
    /// Returns `None` for a json-typed node whose payload does not parse;
    /// the caller decides whether to fail or downgrade to text storage.
    pub fn parse(node_type: &NodeType, raw: &str) -> Option<Self> {
        match node_type {
            NodeType::Json => serde_json::from_str(raw).ok().map(NodeContent::Json),
            _ => Some(NodeContent::Text(raw.to_string())),
        }
    }

    /// The canonical string form: sorted-key JSON or the raw text.
    pub fn canonical_string(&self) -> String {
        match self {
            NodeContent::Json(value) => {
                // Canonicalized values always serialize.
                serde_json::to_string(&canonicalize(value)).unwrap_or_default()
            }
            NodeContent::Text(text) => text.clone(),
        }
    }

    /// SHA-256 over the canonical string form, hex-encoded.
    pub fn content_hash(&self) -> String {
        hash_str(&self.canonical_string())
    }

    /// Size in bytes of the canonical form.
    pub fn size_bytes(&self) -> i64 {
        self.canonical_string().len() as i64
    }

    /// Borrow the JSON document, if this is JSON content.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            NodeContent::Json(value) => Some(value),
            NodeContent::Text(_) => None,
        }
    }

    /// Borrow the text, if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            NodeContent::Json(_) => None,
            NodeContent::Text(text) => Some(text),
        }
    }

    /// The node type this content naturally belongs to.
    pub fn natural_type(&self) -> NodeType {
        match self {
            NodeContent::Json(_) => NodeType::Json,
            NodeContent::Text(_) => NodeType::Markdown,
        }
    }
}

/// Rebuild a JSON value with every object's keys in sorted order,
/// recursively. `serde_json::Map` already iterates sorted without the
/// `preserve_order` feature, but canonical hashing must not depend on a
/// feature flag.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (key, val) in sorted {
                out.insert(key.clone(), canonicalize(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 of an arbitrary string, hex-encoded.
///
/// Used directly for blob references, where only the reference string is
/// hashed (byte transfer is outside this engine).
pub fn hash_str(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_is_key_sorted() {
        let a = NodeContent::Json(json!({"b": 2, "a": 1, "c": {"z": 1, "y": 2}}));
        assert_eq!(a.canonical_string(), r#"{"a":1,"b":2,"c":{"y":2,"z":1}}"#);
    }

    #[test]
    fn test_equivalent_json_hashes_equal() {
        let a = NodeContent::Json(json!({"x": 1, "y": [1, 2]}));
        let b: Value = serde_json::from_str(r#"{ "y": [1, 2], "x": 1 }"#).unwrap();
        assert_eq!(a.content_hash(), NodeContent::Json(b).content_hash());
    }

    #[test]
    fn test_text_hash_is_verbatim() {
        let a = NodeContent::Text("# Title\n\nbody\n".into());
        let b = NodeContent::Text("# Title\n\nbody".into());
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.size_bytes(), 14);
    }

    #[test]
    fn test_parse_respects_declared_type() {
        let parsed = NodeContent::parse(&NodeType::Json, r#"{"a": 1}"#).unwrap();
        assert!(matches!(parsed, NodeContent::Json(_)));

        // Invalid JSON for a json node is a parse failure, not text.
        assert!(NodeContent::parse(&NodeType::Json, "not json {").is_none());

        let parsed = NodeContent::parse(&NodeType::Markdown, "not json {").unwrap();
        assert_eq!(parsed.as_text(), Some("not json {"));
    }

    #[test]
    fn test_sha256_known_vector() {
        // sha256("") is the well-known empty digest.
        assert_eq!(
            hash_str(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
