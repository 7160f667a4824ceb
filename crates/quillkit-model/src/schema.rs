use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Name of the implicit root node type every schema contains.
pub const DOC_TYPE: &str = "doc";
/// Name of the implicit leaf text type every schema contains.
pub const TEXT_TYPE: &str = "text";

/// Specification for a node type contributed to a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Type name, unique within a schema.
    pub name: String,
    /// Tag used by the markup serialization (`<tag>..</tag>`).
    pub tag: String,
    /// True for inline (text-level) nodes, false for block nodes.
    pub inline: bool,
    /// Default attribute values for nodes of this type.
    #[serde(default)]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl NodeSpec {
    /// Convenience constructor for a block node whose tag equals common usage.
    pub fn block(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            inline: false,
            attrs: BTreeMap::new(),
        }
    }

    /// Convenience constructor for an inline node.
    pub fn inline(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            inline: true,
            attrs: BTreeMap::new(),
        }
    }
}

/// Specification for a mark type (inline formatting such as bold or italic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSpec {
    /// Type name, unique within a schema.
    pub name: String,
    /// Tag used by the markup serialization.
    pub tag: String,
}

impl MarkSpec {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The schema contains no block node that could serve as the default
    /// content block. Editing invariants depend on a fallback block existing.
    #[error("schema contains no eligible default block node")]
    NoDefaultBlock,
}

/// A resolved document schema: the merged node and mark type maps.
///
/// Schemas are immutable once constructed; reconfiguration always builds a
/// new one. Every schema implicitly contains a `doc` root type and a `text`
/// leaf type, which contributed specs may override.
#[derive(Debug)]
pub struct Schema {
    nodes: BTreeMap<String, NodeSpec>,
    marks: BTreeMap<String, MarkSpec>,
    /// Reverse lookup from markup tag to node type name.
    node_tags: BTreeMap<String, String>,
    /// Reverse lookup from markup tag to mark type name.
    mark_tags: BTreeMap<String, String>,
    default_block: String,
    fingerprint: u64,
}

impl Schema {
    /// Build a schema from already-merged spec lists.
    ///
    /// Contribution order matters: the first block node becomes the schema's
    /// default block type. Collision handling between contributors happens
    /// upstream (in the extension manager); by the time specs reach here,
    /// names are unique.
    pub fn new(node_specs: Vec<NodeSpec>, mark_specs: Vec<MarkSpec>) -> Result<Arc<Self>, SchemaError> {
        let mut nodes = BTreeMap::new();
        let mut default_block = None;

        for spec in node_specs {
            if !spec.inline && spec.name != DOC_TYPE && default_block.is_none() {
                default_block = Some(spec.name.clone());
            }
            nodes.insert(spec.name.clone(), spec);
        }

        // Implicit root and text types, unless a contribution overrode them.
        nodes.entry(DOC_TYPE.to_string()).or_insert_with(|| NodeSpec {
            name: DOC_TYPE.to_string(),
            tag: String::new(),
            inline: false,
            attrs: BTreeMap::new(),
        });
        nodes.entry(TEXT_TYPE.to_string()).or_insert_with(|| NodeSpec {
            name: TEXT_TYPE.to_string(),
            tag: String::new(),
            inline: true,
            attrs: BTreeMap::new(),
        });

        let default_block = default_block.ok_or(SchemaError::NoDefaultBlock)?;

        let mut marks = BTreeMap::new();
        for spec in mark_specs {
            marks.insert(spec.name.clone(), spec);
        }

        let mut node_tags = BTreeMap::new();
        for spec in nodes.values() {
            if !spec.tag.is_empty() {
                node_tags.insert(spec.tag.clone(), spec.name.clone());
            }
        }
        let mut mark_tags = BTreeMap::new();
        for spec in marks.values() {
            if !spec.tag.is_empty() {
                mark_tags.insert(spec.tag.clone(), spec.name.clone());
            }
        }

        let fingerprint = fingerprint_of(&nodes, &marks);

        Ok(Arc::new(Self {
            nodes,
            marks,
            node_tags,
            mark_tags,
            default_block,
            fingerprint,
        }))
    }

    /// Look up a node spec by type name.
    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name)
    }

    /// Look up a mark spec by type name.
    pub fn mark(&self, name: &str) -> Option<&MarkSpec> {
        self.marks.get(name)
    }

    /// Look up a node type name by its markup tag.
    pub fn node_for_tag(&self, tag: &str) -> Option<&str> {
        self.node_tags.get(tag).map(String::as_str)
    }

    /// Look up a mark type name by its markup tag.
    pub fn mark_for_tag(&self, tag: &str) -> Option<&str> {
        self.mark_tags.get(tag).map(String::as_str)
    }

    /// The fallback block type used when content must be wrapped or created.
    pub fn default_block(&self) -> &str {
        &self.default_block
    }

    /// All node specs, sorted by name.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values()
    }

    /// All mark specs, sorted by name.
    pub fn marks(&self) -> impl Iterator<Item = &MarkSpec> {
        self.marks.values()
    }

    /// Stable hash over the schema's type names and tags.
    ///
    /// Two separately constructed schemas with identical specs share a
    /// fingerprint, so compatibility checks don't rely on pointer identity.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// True when every node and mark type of `other` also exists here.
    pub fn is_superset_of(&self, other: &Schema) -> bool {
        other.nodes.keys().all(|n| self.nodes.contains_key(n))
            && other.marks.keys().all(|m| self.marks.contains_key(m))
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

fn fingerprint_of(nodes: &BTreeMap<String, NodeSpec>, marks: &BTreeMap<String, MarkSpec>) -> u64 {
    let mut hasher = DefaultHasher::new();
    // BTreeMap iteration is sorted, so the hash is order-independent with
    // respect to contribution order.
    for (name, spec) in nodes {
        name.hash(&mut hasher);
        spec.tag.hash(&mut hasher);
        spec.inline.hash(&mut hasher);
    }
    0xff_u8.hash(&mut hasher);
    for (name, spec) in marks {
        name.hash(&mut hasher);
        spec.tag.hash(&mut hasher);
    }
    hasher.finish()
}
