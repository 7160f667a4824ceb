//! # quillkit-core
//!
//! The extensible core of a rich structured-document editor. It does three
//! jobs:
//!
//! 1. **Extension resolution** (`extension`): assembles one document schema,
//!    one command set, one keybinding table and one ordered plugin/input-rule
//!    pipeline from independently-authored, priority-ordered extensions, and
//!    supports hot reconfiguration with content migration.
//! 2. **State reconciliation** (`reconcile`): governs how document state
//!    evolves across edit transactions, in either uncontrolled (internal
//!    authority) or controlled (external authority) mode.
//! 3. **Positioner updates** (`positioner`): keeps floating-UI position data
//!    synchronized to state changes, memoizing computed positions so
//!    unchanged or inactive states cost nothing.
//!
//! Supporting modules: `compare` (cheap state change detection), `keymap`
//! (priority-ordered handler chains per key combination) and `frame` (the
//! integration surface the view-rendering collaborator talks to).
//!
//! Rendering, styling and the low-level document tree live elsewhere; this
//! crate orchestrates `quillkit-model` and exposes everything a view layer
//! needs through explicit values, never ambient globals.

pub mod compare;
pub mod extension;
pub mod frame;
pub mod keymap;
pub mod positioner;
pub mod reconcile;

pub use extension::{
    Command, Extension, ExtensionIdentity, InputRule, Manager, ManagerItem, Preset, Priority,
    Reconfigured, ResolveError, ViewPlugin,
};
pub use frame::{Frame, FrameRole, RootConfig, RootProps, UsageError};
pub use keymap::{KeyContext, KeyHandler, dispatch_key, merge_keybindings};
pub use positioner::{
    AnchorRect, Point, Positioner, PositionerProps, PositionerRegistry, SelectionPositioner,
};
pub use reconcile::{
    ChangePayload, Content, EditorOptions, FocusTarget, InvalidContentError, Mode, Phase,
    ReconcileError, Reconciler, StateChangePayload,
};
