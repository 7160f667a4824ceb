use std::sync::Arc;

use crate::node::Node;
use crate::schema::Schema;

/// A selection inside a document, as a pair of positions.
///
/// `anchor` is the fixed end, `head` the moving end; the two are equal for a
/// collapsed cursor. Positions count tree positions (see [`Node::node_size`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn cursor(at: usize) -> Self {
        Self { anchor: at, head: at }
    }

    pub fn range(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// Lower of the two ends.
    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    /// Higher of the two ends.
    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    /// Clamp both ends into `[0, max]`.
    pub fn clamped(self, max: usize) -> Self {
        Self {
            anchor: self.anchor.min(max),
            head: self.head.min(max),
        }
    }
}

/// An immutable snapshot of document content plus selection, keyed to a
/// specific schema.
///
/// States are never mutated: applying a transaction produces a new state
/// with bumped version counters. `version` increments on every applied
/// transaction; `doc_version` only when document content changed, which is
/// what makes cheap change detection possible downstream.
#[derive(Debug, Clone)]
pub struct DocumentState {
    doc: Node,
    selection: Selection,
    schema: Arc<Schema>,
    version: u64,
    doc_version: u64,
}

impl DocumentState {
    /// Create an initial state with the cursor at the end of the document.
    pub fn new(doc: Node, schema: Arc<Schema>) -> Self {
        let end = doc.content_size();
        Self {
            doc,
            selection: Selection::cursor(end),
            schema,
            version: 0,
            doc_version: 0,
        }
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Total counter, bumped by every applied transaction.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bumped only when document content (not just selection) changed.
    pub fn doc_version(&self) -> u64 {
        self.doc_version
    }

    /// Size of the document's content, the maximum valid position.
    pub fn content_size(&self) -> usize {
        self.doc.content_size()
    }

    /// Successor state with a new selection and untouched content.
    pub fn with_selection(&self, selection: Selection) -> Self {
        let selection = selection.clamped(self.content_size());
        Self {
            doc: self.doc.clone(),
            selection,
            schema: Arc::clone(&self.schema),
            version: self.version + 1,
            doc_version: self.doc_version,
        }
    }

    /// Successor state with replaced document content (wholesale replacement,
    /// not a transaction). Selection is clamped into the new document.
    pub fn with_doc(&self, doc: Node) -> Self {
        let max = doc.content_size();
        Self {
            doc,
            selection: self.selection.clamped(max),
            schema: Arc::clone(&self.schema),
            version: self.version + 1,
            doc_version: self.doc_version + 1,
        }
    }

    /// Successor state used by transaction application.
    pub(crate) fn advanced(&self, doc: Node, selection: Selection, doc_changed: bool) -> Self {
        Self {
            doc,
            selection,
            schema: Arc::clone(&self.schema),
            version: self.version + 1,
            doc_version: self.doc_version + u64::from(doc_changed),
        }
    }
}

impl PartialEq for DocumentState {
    fn eq(&self, other: &Self) -> bool {
        // Essential state only; the schema is compared by fingerprint since
        // separately resolved but identical schemas are interchangeable.
        self.version == other.version
            && self.doc_version == other.doc_version
            && self.selection == other.selection
            && self.schema.fingerprint() == other.schema.fingerprint()
            && self.doc == other.doc
    }
}

/// The `{previous, current}` pair handed to reconciliation and positioning
/// logic whenever state evolves.
#[derive(Debug, Clone, Copy)]
pub struct StatePair<'a> {
    pub old: &'a DocumentState,
    pub new: &'a DocumentState,
}

impl<'a> StatePair<'a> {
    pub fn new(old: &'a DocumentState, new: &'a DocumentState) -> Self {
        Self { old, new }
    }
}
