//! # quillkit-model
//!
//! The minimal low-level document engine that the quillkit editor core
//! orchestrates. It deliberately stays small: the interesting behavior
//! (extension resolution, state reconciliation, positioner updates) lives in
//! `quillkit-core`; this crate only provides the pieces that behavior is
//! expressed in terms of:
//!
//! - **`schema`**: node/mark type specifications and the resolved [`Schema`]
//! - **`node`**: the immutable document tree with position arithmetic
//! - **`state`**: immutable [`DocumentState`] snapshots and selections
//! - **`transaction`**: the edit algebra — steps compile into new states
//! - **`markup`**: string serialization used for schema migration
//! - **`content`**: JSON content ingestion with schema validation

pub mod content;
pub mod markup;
pub mod node;
pub mod schema;
pub mod state;
pub mod transaction;

pub use content::{ContentError, ContentNode, InvalidBlock, strip_invalid_blocks};
pub use markup::{MarkupError, from_markup, to_markup};
pub use node::Node;
pub use schema::{MarkSpec, NodeSpec, Schema, SchemaError};
pub use state::{DocumentState, Selection, StatePair};
pub use transaction::{ApplyError, Origin, Step, Transaction};
