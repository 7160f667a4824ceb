use uuid::Uuid;

use crate::node::Node;
use crate::schema::{DOC_TYPE, Schema};
use crate::state::{DocumentState, Selection};

/// Distinguishes edits produced inside the editor from externally-injected
/// state replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Internal,
    External,
}

/// One atomic edit operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    InsertText { at: usize, text: String },
    DeleteRange { from: usize, to: usize },
    SetSelection { anchor: usize, head: usize },
}

/// An ordered list of steps plus metadata. Never mutated after creation;
/// applying one to a [`DocumentState`] yields a new state.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    id: Uuid,
    origin: Origin,
    steps: Vec<Step>,
}

impl Transaction {
    pub fn new(origin: Origin) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            steps: Vec::new(),
        }
    }

    /// Shorthand for a transaction produced by the editor itself.
    pub fn internal() -> Self {
        Self::new(Origin::Internal)
    }

    pub fn insert_text(mut self, at: usize, text: impl Into<String>) -> Self {
        self.steps.push(Step::InsertText {
            at,
            text: text.into(),
        });
        self
    }

    pub fn delete_range(mut self, from: usize, to: usize) -> Self {
        self.steps.push(Step::DeleteRange { from, to });
        self
    }

    pub fn set_selection(mut self, anchor: usize, head: usize) -> Self {
        self.steps.push(Step::SetSelection { anchor, head });
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// True when no step modifies document content.
    pub fn is_selection_only(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s, Step::SetSelection { .. }))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("transaction position {pos} is outside the document (max {max})")]
    InvalidPosition { pos: usize, max: usize },
    #[error(
        "document schema (fingerprint {found:#x}) does not match the active schema \
         (fingerprint {expected:#x}); migrate content before applying transactions"
    )]
    SchemaMismatch { expected: u64, found: u64 },
}

impl DocumentState {
    /// Apply a transaction, yielding the successor state.
    ///
    /// Pure with respect to `self`: the original state is untouched. Steps
    /// apply in order; the selection is mapped through each content step and
    /// overridden by explicit `SetSelection` steps.
    pub fn apply(&self, tr: &Transaction) -> Result<DocumentState, ApplyError> {
        let schema = std::sync::Arc::clone(self.schema());
        let mut doc = self.doc().clone();
        let mut selection = self.selection();
        let mut doc_changed = false;

        for step in tr.steps() {
            match step {
                Step::InsertText { at, text } => {
                    let max = doc.content_size();
                    if *at > max {
                        return Err(ApplyError::InvalidPosition { pos: *at, max });
                    }
                    doc = insert_into_element(&doc, &schema, *at, text);
                    let len = text.chars().count();
                    selection = Selection::range(
                        map_insert(selection.anchor, *at, len),
                        map_insert(selection.head, *at, len),
                    );
                    doc_changed = true;
                }
                Step::DeleteRange { from, to } => {
                    let max = doc.content_size();
                    if from > to || *to > max {
                        return Err(ApplyError::InvalidPosition { pos: *to, max });
                    }
                    let (new_doc, removed) = delete_in_element(&doc, *from, *to);
                    doc = new_doc;
                    selection = Selection::range(
                        map_delete(selection.anchor, *from, *to, removed),
                        map_delete(selection.head, *from, *to, removed),
                    );
                    doc_changed = true;
                }
                Step::SetSelection { anchor, head } => {
                    selection = Selection::range(*anchor, *head);
                }
            }
        }

        let selection = selection.clamped(doc.content_size());
        Ok(self.advanced(doc, selection, doc_changed))
    }
}

/// Map a position through an insertion of `len` characters at `at`.
fn map_insert(pos: usize, at: usize, len: usize) -> usize {
    if pos < at { pos } else { pos + len }
}

/// Map a position through a deletion of `removed` characters in `from..to`.
///
/// Positions inside the deleted range collapse to its start; only removed
/// characters shift later positions (structural boundaries survive).
fn map_delete(pos: usize, from: usize, to: usize, removed: usize) -> usize {
    if pos <= from {
        pos
    } else if pos >= to {
        pos - removed
    } else {
        from
    }
}

/// Insert `text` at content position `pos` inside `el`.
///
/// Boundary positions resolve toward the earliest text location: a position
/// before an element descends to that element's content start, a position
/// at the very end descends into the last child. Inserting into an empty
/// document creates a default block to hold the text.
fn insert_into_element(el: &Node, schema: &Schema, pos: usize, text: &str) -> Node {
    let mut children = el.children.clone();
    let mut remaining = pos;

    for i in 0..children.len() {
        let size = children[i].node_size();
        if children[i].is_text() {
            if remaining <= size {
                let updated = splice_text(&children[i], remaining, text);
                children[i] = updated;
                return rebuilt(el, children);
            }
        } else if remaining < size {
            let inner = remaining.saturating_sub(1);
            let updated = insert_into_element(&children[i], schema, inner, text);
            children[i] = updated;
            return rebuilt(el, children);
        }
        remaining -= size;
    }

    // Position is the end of this element's content.
    let descend_last = matches!(children.last(), Some(last) if !last.is_text());
    if descend_last {
        let idx = children.len() - 1;
        let inner = children[idx].content_size();
        let updated = insert_into_element(&children[idx], schema, inner, text);
        children[idx] = updated;
    } else if el.type_name == DOC_TYPE && children.is_empty() {
        children.push(Node::element(
            schema.default_block(),
            vec![Node::text(text)],
        ));
    } else {
        children.push(Node::text(text));
    }
    rebuilt(el, children)
}

fn splice_text(node: &Node, char_pos: usize, text: &str) -> Node {
    let existing = node.text.as_deref().unwrap_or("");
    let byte = existing
        .char_indices()
        .nth(char_pos)
        .map(|(b, _)| b)
        .unwrap_or(existing.len());
    let mut spliced = existing.to_string();
    spliced.insert_str(byte, text);
    Node {
        text: Some(spliced),
        ..node.clone()
    }
}

/// Delete the text characters of `el`'s content intersecting `from..to`
/// (local content coordinates). Structural boundaries inside the range are
/// kept; emptied text nodes are dropped. Returns the new node and the number
/// of characters removed.
fn delete_in_element(el: &Node, from: usize, to: usize) -> (Node, usize) {
    let mut out = Vec::with_capacity(el.children.len());
    let mut removed = 0;
    let mut acc = 0;

    for child in &el.children {
        let size = child.node_size();
        match &child.text {
            Some(t) => {
                let ls = from.saturating_sub(acc).min(size);
                let le = to.saturating_sub(acc).min(size);
                if le > ls {
                    let mut kept: String = t.chars().take(ls).collect();
                    kept.extend(t.chars().skip(le));
                    removed += le - ls;
                    if !kept.is_empty() {
                        out.push(Node {
                            text: Some(kept),
                            ..child.clone()
                        });
                    }
                } else {
                    out.push(child.clone());
                }
            }
            None => {
                let inner_size = child.content_size();
                let inner_from = from.saturating_sub(acc + 1).min(inner_size);
                let inner_to = to.saturating_sub(acc + 1).min(inner_size);
                if inner_to > inner_from {
                    let (new_child, r) = delete_in_element(child, inner_from, inner_to);
                    removed += r;
                    out.push(new_child);
                } else {
                    out.push(child.clone());
                }
            }
        }
        acc += size;
    }

    (rebuilt(el, out), removed)
}

fn rebuilt(el: &Node, children: Vec<Node>) -> Node {
    Node {
        children,
        ..el.clone()
    }
}
