//! Schema-agnostic markup serialization.
//!
//! `to_markup`/`from_markup` form the content serialization contract used
//! for schema migration during hot reconfiguration and for string-based
//! initial content. The format is a minimal tag markup: each node/mark spec
//! names the tag it serializes to, text is entity-escaped.
//!
//! Parsing is deliberately lenient about vocabulary: a tag the target schema
//! doesn't know is unwrapped (its children hoisted into the parent), so
//! migrating to a narrower schema never loses text content.

use crate::node::Node;
use crate::schema::{DOC_TYPE, Schema};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MarkupError {
    #[error("unexpected end of markup while <{expected}> is still open")]
    UnexpectedEof { expected: String },
    #[error("closing tag </{found}> at byte {at} does not match open tag <{expected}>")]
    MismatchedClose {
        expected: String,
        found: String,
        at: usize,
    },
    #[error("closing tag </{found}> at byte {at} has no matching open tag")]
    UnexpectedClose { found: String, at: usize },
    #[error("malformed tag at byte {at}")]
    MalformedTag { at: usize },
}

/// Serialize a document's content to a markup string under `schema`.
pub fn to_markup(doc: &Node, schema: &Schema) -> String {
    let mut out = String::new();
    for child in &doc.children {
        write_node(&mut out, child, schema);
    }
    out
}

fn write_node(out: &mut String, node: &Node, schema: &Schema) {
    match &node.text {
        Some(text) => {
            let mut open = Vec::new();
            for mark in &node.marks {
                if let Some(spec) = schema.mark(mark)
                    && !spec.tag.is_empty()
                {
                    out.push('<');
                    out.push_str(&spec.tag);
                    out.push('>');
                    open.push(spec.tag.as_str());
                }
            }
            out.push_str(&html_escape::encode_text(text));
            for tag in open.iter().rev() {
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
        None => {
            let tag = schema
                .node(&node.type_name)
                .map(|s| s.tag.as_str())
                .unwrap_or("");
            if tag.is_empty() {
                for child in &node.children {
                    write_node(out, child, schema);
                }
            } else {
                out.push('<');
                out.push_str(tag);
                out.push('>');
                for child in &node.children {
                    write_node(out, child, schema);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

/// Parse a markup string into a document node under `schema`.
///
/// Top-level text and inline nodes are wrapped into the schema's default
/// block so the result is always a valid document.
pub fn from_markup(markup: &str, schema: &Schema) -> Result<Node, MarkupError> {
    let mut cur = Cursor::new(markup);
    let nodes = parse_nodes(&mut cur, schema, &[], None)?;
    Ok(wrap_top_level(nodes, schema))
}

/// A byte cursor over the markup string.
struct Cursor<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    fn eof(&self) -> bool {
        self.i >= self.s.len()
    }

    fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.i).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.s.as_bytes().get(self.i + offset).copied()
    }

    fn starts_with(&self, pat: &[u8]) -> bool {
        self.s.as_bytes()[self.i..].starts_with(pat)
    }

    fn bump(&mut self) {
        // Advance one full character so text runs never split inside a
        // multi-byte sequence.
        let mut next = self.i + 1;
        while next < self.s.len() && !self.s.is_char_boundary(next) {
            next += 1;
        }
        self.i = next;
    }

    fn bump_n(&mut self, n: usize) {
        self.i += n;
    }
}

fn read_tag_name(cur: &mut Cursor<'_>) -> String {
    let start = cur.i;
    while let Some(b) = cur.peek() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            cur.bump_n(1);
        } else {
            break;
        }
    }
    cur.s[start..cur.i].to_string()
}

fn parse_nodes(
    cur: &mut Cursor<'_>,
    schema: &Schema,
    marks: &[String],
    close: Option<&str>,
) -> Result<Vec<Node>, MarkupError> {
    let mut out = Vec::new();
    let mut text_start = cur.i;

    loop {
        if cur.eof() {
            flush_text(&mut out, cur.s, text_start, cur.i, marks);
            return match close {
                Some(tag) => Err(MarkupError::UnexpectedEof {
                    expected: tag.to_string(),
                }),
                None => Ok(out),
            };
        }

        if cur.starts_with(b"</") {
            flush_text(&mut out, cur.s, text_start, cur.i, marks);
            let at = cur.i;
            cur.bump_n(2);
            let name = read_tag_name(cur);
            if name.is_empty() || cur.peek() != Some(b'>') {
                return Err(MarkupError::MalformedTag { at });
            }
            cur.bump_n(1);
            return match close {
                Some(tag) if tag == name => Ok(out),
                Some(tag) => Err(MarkupError::MismatchedClose {
                    expected: tag.to_string(),
                    found: name,
                    at,
                }),
                None => Err(MarkupError::UnexpectedClose { found: name, at }),
            };
        }

        if cur.peek() == Some(b'<') && cur.peek_at(1).is_some_and(|b| b.is_ascii_alphabetic()) {
            flush_text(&mut out, cur.s, text_start, cur.i, marks);
            let at = cur.i;
            cur.bump_n(1);
            let name = read_tag_name(cur);
            if cur.peek() != Some(b'>') {
                return Err(MarkupError::MalformedTag { at });
            }
            cur.bump_n(1);

            if let Some(node_type) = schema.node_for_tag(&name) {
                let node_type = node_type.to_string();
                let children = parse_nodes(cur, schema, marks, Some(&name))?;
                out.push(Node::element(node_type, children));
            } else if let Some(mark_type) = schema.mark_for_tag(&name) {
                let mut inner = marks.to_vec();
                inner.push(mark_type.to_string());
                let children = parse_nodes(cur, schema, &inner, Some(&name))?;
                out.extend(children);
            } else {
                // Unknown vocabulary: hoist children, keep the text.
                log::debug!("unwrapping unknown markup tag <{name}>");
                let children = parse_nodes(cur, schema, marks, Some(&name))?;
                out.extend(children);
            }
            text_start = cur.i;
            continue;
        }

        cur.bump();
    }
}

fn flush_text(out: &mut Vec<Node>, s: &str, start: usize, end: usize, marks: &[String]) {
    if end > start {
        let decoded = html_escape::decode_html_entities(&s[start..end]).into_owned();
        if !decoded.is_empty() {
            out.push(Node::marked_text(decoded, marks.to_vec()));
        }
    }
}

fn wrap_top_level(nodes: Vec<Node>, schema: &Schema) -> Node {
    let mut children = Vec::new();
    let mut inline_run: Vec<Node> = Vec::new();

    for node in nodes {
        let is_inline = node.is_text()
            || schema
                .node(&node.type_name)
                .map(|s| s.inline)
                .unwrap_or(true);
        if is_inline {
            inline_run.push(node);
        } else {
            flush_inline_run(&mut children, &mut inline_run, schema);
            children.push(node);
        }
    }
    flush_inline_run(&mut children, &mut inline_run, schema);

    Node::element(DOC_TYPE, children)
}

fn flush_inline_run(children: &mut Vec<Node>, run: &mut Vec<Node>, schema: &Schema) {
    if !run.is_empty() {
        children.push(Node::element(
            schema.default_block().to_string(),
            std::mem::take(run),
        ));
    }
}
