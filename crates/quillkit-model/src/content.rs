//! JSON content ingestion.
//!
//! Documents can be supplied as JSON (`{"type": "doc", "content": [...]}`).
//! Ingestion validates every node type against the target schema and
//! collects the offending paths instead of failing on the first one, so
//! callers can repair content (for example with [`strip_invalid_blocks`])
//! and retry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::Node;
use crate::schema::{DOC_TYPE, Schema};

/// Serde mirror of [`Node`] in the external JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentNode>,
}

/// A content block rejected by schema validation, addressed by its child
/// index path from the document root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidBlock {
    pub path: Vec<usize>,
    pub type_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("content JSON does not have the expected shape: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{} content block(s) are invalid for the current schema", invalid_blocks.len())]
    InvalidBlocks { invalid_blocks: Vec<InvalidBlock> },
}

impl Node {
    /// Build a document node from JSON content, validating against `schema`.
    ///
    /// Unknown node types are collected as [`InvalidBlock`]s (all of them,
    /// not just the first). Unknown marks are stripped rather than rejected.
    pub fn from_content(value: &Value, schema: &Schema) -> Result<Node, ContentError> {
        let content: ContentNode = serde_json::from_value(value.clone())?;
        let mut invalid = Vec::new();
        collect_invalid(&content, schema, &mut Vec::new(), &mut invalid);
        if !invalid.is_empty() {
            return Err(ContentError::InvalidBlocks {
                invalid_blocks: invalid,
            });
        }
        Ok(build_node(&content, schema))
    }
}

fn collect_invalid(
    node: &ContentNode,
    schema: &Schema,
    path: &mut Vec<usize>,
    out: &mut Vec<InvalidBlock>,
) {
    if schema.node(&node.type_name).is_none() {
        out.push(InvalidBlock {
            path: path.clone(),
            type_name: node.type_name.clone(),
        });
        // Children of an invalid block are unreachable anyway.
        return;
    }
    for (i, child) in node.content.iter().enumerate() {
        path.push(i);
        collect_invalid(child, schema, path, out);
        path.pop();
    }
}

fn build_node(content: &ContentNode, schema: &Schema) -> Node {
    let marks = content
        .marks
        .iter()
        .filter(|m| {
            let known = schema.mark(m).is_some();
            if !known {
                log::debug!("stripping unknown mark '{m}' from content");
            }
            known
        })
        .cloned()
        .collect();
    Node {
        type_name: content.type_name.clone(),
        attrs: content.attrs.clone(),
        marks,
        text: content.text.clone(),
        children: content
            .content
            .iter()
            .map(|c| build_node(c, schema))
            .collect(),
    }
}

/// Built-in recovery transformer: remove the invalid subtrees from `json`.
///
/// Paths are removed deepest/highest-index first so earlier removals never
/// shift the remaining paths. An invalid root collapses to an empty doc.
pub fn strip_invalid_blocks(json: &Value, blocks: &[InvalidBlock]) -> Value {
    if blocks.iter().any(|b| b.path.is_empty()) {
        return serde_json::json!({ "type": DOC_TYPE });
    }
    let mut result = json.clone();
    let mut paths: Vec<&[usize]> = blocks.iter().map(|b| b.path.as_slice()).collect();
    paths.sort();
    for path in paths.iter().rev() {
        remove_at_path(&mut result, path);
    }
    result
}

fn remove_at_path(value: &mut Value, path: &[usize]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = value;
    for idx in parents {
        match cursor.get_mut("content").and_then(|c| c.get_mut(idx)) {
            Some(next) => cursor = next,
            None => return,
        }
    }
    if let Some(arr) = cursor.get_mut("content").and_then(|c| c.as_array_mut())
        && *last < arr.len()
    {
        arr.remove(*last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MarkSpec, NodeSpec};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn test_schema() -> Arc<Schema> {
        Schema::new(
            vec![NodeSpec::block("paragraph", "p")],
            vec![MarkSpec::new("bold", "strong")],
        )
        .unwrap()
    }

    fn hello_json() -> Value {
        json!({
            "type": "doc",
            "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "Hello" }] }
            ]
        })
    }

    #[test]
    fn valid_content_builds_a_document() {
        let schema = test_schema();
        let doc = Node::from_content(&hello_json(), &schema).unwrap();
        assert_eq!(doc.type_name, "doc");
        assert_eq!(doc.text_content(), "Hello");
    }

    #[test]
    fn unknown_node_types_are_collected_with_paths() {
        let schema = test_schema();
        let json = json!({
            "type": "doc",
            "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "ok" }] },
                { "type": "table", "content": [] },
                { "type": "paragraph", "content": [{ "type": "mention" }] }
            ]
        });
        let err = Node::from_content(&json, &schema).unwrap_err();
        match err {
            ContentError::InvalidBlocks { invalid_blocks } => {
                assert_eq!(
                    invalid_blocks,
                    vec![
                        InvalidBlock {
                            path: vec![1],
                            type_name: "table".to_string()
                        },
                        InvalidBlock {
                            path: vec![2, 0],
                            type_name: "mention".to_string()
                        },
                    ]
                );
            }
            other => panic!("expected InvalidBlocks, got {other:?}"),
        }
    }

    #[test]
    fn unknown_marks_are_stripped_not_rejected() {
        let schema = test_schema();
        let json = json!({
            "type": "doc",
            "content": [
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "x", "marks": ["bold", "sparkle"] }
                ] }
            ]
        });
        let doc = Node::from_content(&json, &schema).unwrap();
        assert_eq!(doc.children[0].children[0].marks, vec!["bold".to_string()]);
    }

    #[test]
    fn strip_invalid_blocks_repairs_content() {
        let schema = test_schema();
        let json = json!({
            "type": "doc",
            "content": [
                { "type": "table", "content": [] },
                { "type": "paragraph", "content": [{ "type": "text", "text": "kept" }] }
            ]
        });
        let err = Node::from_content(&json, &schema).unwrap_err();
        let ContentError::InvalidBlocks { invalid_blocks } = err else {
            panic!("expected invalid blocks");
        };
        let repaired = strip_invalid_blocks(&json, &invalid_blocks);
        let doc = Node::from_content(&repaired, &schema).unwrap();
        assert_eq!(doc.text_content(), "kept");
        assert_eq!(doc.children.len(), 1);
    }

    #[test]
    fn invalid_root_collapses_to_empty_doc() {
        let blocks = vec![InvalidBlock {
            path: vec![],
            type_name: "html".to_string(),
        }];
        let repaired = strip_invalid_blocks(&json!({ "type": "html" }), &blocks);
        assert_eq!(repaired, json!({ "type": "doc" }));
    }

    #[test]
    fn malformed_json_shape_is_reported() {
        let schema = test_schema();
        let err = Node::from_content(&json!({ "content": "nope" }), &schema).unwrap_err();
        assert!(matches!(err, ContentError::Malformed(_)));
    }

    #[test]
    fn content_node_round_trips_through_serde() {
        let json = hello_json();
        let content: ContentNode = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(serde_json::to_value(&content).unwrap(), json);
    }
}
