use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::TEXT_TYPE;

/// An immutable node in the document tree.
///
/// Leaf text nodes carry `text` and optional marks; element nodes carry
/// `children`. Position arithmetic follows the usual tree-position model:
/// a text node occupies one position per character, an element occupies one
/// position for its opening boundary, its content, and one for its closing
/// boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Schema type name ("doc", "paragraph", "text", ...).
    pub type_name: String,
    /// Attribute values. Empty for most nodes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, serde_json::Value>,
    /// Mark type names applied to this node (text nodes only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<String>,
    /// Text payload for leaf text nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Child nodes for element nodes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    /// Create a text leaf node.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            type_name: TEXT_TYPE.to_string(),
            attrs: BTreeMap::new(),
            marks: Vec::new(),
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    /// Create a text leaf node carrying the given marks.
    pub fn marked_text(text: impl Into<String>, marks: Vec<String>) -> Self {
        Self {
            marks,
            ..Self::text(text)
        }
    }

    /// Create an element node with the given children.
    pub fn element(type_name: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            type_name: type_name.into(),
            attrs: BTreeMap::new(),
            marks: Vec::new(),
            text: None,
            children,
        }
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    /// Number of positions this node occupies in its parent.
    ///
    /// Text: one per character. Element: two boundary positions plus content.
    pub fn node_size(&self) -> usize {
        match &self.text {
            Some(text) => text.chars().count(),
            None => 2 + self.content_size(),
        }
    }

    /// Number of positions inside this node (sum of child sizes).
    pub fn content_size(&self) -> usize {
        self.children.iter().map(Node::node_size).sum()
    }

    /// Concatenated text of this node and all descendants.
    pub fn text_content(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => self.children.iter().map(Node::text_content).collect(),
        }
    }

    /// Depth-first walk over this node and all descendants.
    pub fn descendants(&self) -> impl Iterator<Item = &Node> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}
