//! State reconciliation: how document state evolves across transactions.
//!
//! A [`Reconciler`] owns the canonical [`DocumentState`] and mediates every
//! way it can change: transaction dispatch, wholesale content replacement
//! and external state adoption. Mode is fixed at construction. Uncontrolled
//! reconcilers apply transactions immediately; controlled reconcilers only
//! produce candidate states and adopt whatever the external owner submits
//! back through [`Reconciler::submit_state`].

use std::fmt;
use std::sync::Arc;

use quillkit_model::{
    ApplyError, ContentError, DocumentState, InvalidBlock, MarkupError, Node, Schema, Selection,
    Transaction, from_markup,
};

use crate::extension::{Manager, ManagerItem, ResolveError};
use crate::keymap::dispatch_key;

/// Attempts given to the content recovery hook before giving up.
pub const MAX_CONTENT_RETRIES: usize = 3;

/// Who owns the canonical state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The reconciler itself; dispatched transactions apply immediately.
    Uncontrolled,
    /// An external caller; dispatch produces candidates, adoption happens
    /// through [`Reconciler::submit_state`].
    Controlled,
}

/// Lifecycle position of a reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Idle,
    ApplyingTransaction,
    AwaitingExternalState,
}

/// Document content in any of the accepted input forms.
#[derive(Debug, Clone)]
pub enum Content {
    /// Markup string, parsed under the active schema.
    Markup(String),
    /// JSON content, validated against the active schema.
    Json(serde_json::Value),
    /// An already-built document node, taken as-is.
    Doc(Node),
}

/// Where to place the selection when focusing the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    Start,
    End,
    /// A single offset, clamped into the document.
    At(usize),
    /// An explicit range, both ends clamped.
    Range { from: usize, to: usize },
    /// Restore the selection saved at the last blur, falling back to the
    /// current selection.
    Previous,
    /// Do nothing.
    Ignore,
}

impl From<bool> for FocusTarget {
    fn from(restore: bool) -> Self {
        if restore { FocusTarget::Previous } else { FocusTarget::Ignore }
    }
}

impl From<usize> for FocusTarget {
    fn from(at: usize) -> Self {
        FocusTarget::At(at)
    }
}

/// Content rejected by schema validation, with enough context for a recovery
/// hook to transform and retry.
#[derive(Debug, thiserror::Error)]
#[error("content is invalid for the current schema ({} invalid block(s))", invalid_blocks.len())]
pub struct InvalidContentError {
    /// The offending JSON, exactly as submitted.
    pub json: serde_json::Value,
    /// The rejected blocks, addressed by child-index path from the root.
    pub invalid_blocks: Vec<InvalidBlock>,
    #[source]
    pub source: ContentError,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("reconciler is not initialized; call init first")]
    Uninitialized,
    #[error("dispatch called re-entrantly while a transaction is being applied")]
    ReentrantDispatch,
    #[error("a controlled reconciler is awaiting external state; submit_state first")]
    AwaitingExternalState,
    #[error("submit_state is only available in controlled mode")]
    NotControlled,
    #[error("no command named '{0}' is registered")]
    UnknownCommand(String),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Markup(#[from] MarkupError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    InvalidContent(#[from] InvalidContentError),
}

/// Payload handed to `on_change` listeners after state was adopted.
pub struct ChangePayload<'a> {
    pub old: &'a DocumentState,
    pub new: &'a DocumentState,
    /// `None` for wholesale content replacement and external adoption.
    pub transaction: Option<&'a Transaction>,
}

/// Payload handed to `on_state_change` listeners in controlled mode. The
/// candidate has NOT been adopted; the listener's owner decides what to
/// submit back.
pub struct StateChangePayload<'a> {
    pub old: &'a DocumentState,
    pub candidate: &'a DocumentState,
    pub transaction: &'a Transaction,
    schema: &'a Arc<Schema>,
}

impl StateChangePayload<'_> {
    /// Build a fresh state from raw content under the active schema, for
    /// owners that derive their canonical value from content rather than
    /// from the candidate.
    pub fn create_state_from_content(
        &self,
        content: &Content,
    ) -> Result<DocumentState, ReconcileError> {
        let doc = doc_from_content(content, self.schema)?;
        Ok(DocumentState::new(doc, Arc::clone(self.schema)))
    }
}

type ChangeListener = Box<dyn FnMut(&ChangePayload<'_>)>;
type StateChangeListener = Box<dyn FnMut(&StateChangePayload<'_>)>;
type FocusListener = Box<dyn FnMut(Selection)>;
type BlurListener = Box<dyn FnMut(Selection)>;
/// Given the rejected content, produce transformed content to retry with.
pub type RecoveryHook = Box<dyn FnMut(&InvalidContentError) -> serde_json::Value>;

/// Construction-time options. Everything is optional; the defaults give an
/// empty document and no recovery hook.
#[derive(Default)]
pub struct EditorOptions {
    /// Content the document starts from. Empty default block when absent.
    pub initial_content: Option<Content>,
    /// What [`Reconciler::clear_content`] resets to. Empty default block
    /// when absent.
    pub fallback_content: Option<Content>,
    /// Invoked when submitted content fails schema validation; its output
    /// is retried, up to [`MAX_CONTENT_RETRIES`] attempts total.
    pub recovery_hook: Option<RecoveryHook>,
}

impl fmt::Debug for EditorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorOptions")
            .field("initial_content", &self.initial_content)
            .field("fallback_content", &self.fallback_content)
            .field("recovery_hook", &self.recovery_hook.is_some())
            .finish()
    }
}

pub struct Reconciler {
    manager: Manager,
    mode: Mode,
    phase: Phase,
    state: Option<DocumentState>,
    initial_content: Option<Content>,
    fallback_content: Option<Content>,
    recovery_hook: Option<RecoveryHook>,
    /// Selection saved at the last blur, restored by `FocusTarget::Previous`.
    previous_selection: Option<Selection>,
    /// Focus is applied on the owner's next tick, never synchronously; a
    /// later request supersedes a pending one.
    pending_focus: Option<FocusTarget>,
    focused: bool,
    on_change: Option<ChangeListener>,
    on_state_change: Option<StateChangeListener>,
    on_focus: Option<FocusListener>,
    on_blur: Option<BlurListener>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("mode", &self.mode)
            .field("phase", &self.phase)
            .field("version", &self.state.as_ref().map(DocumentState::version))
            .field("focused", &self.focused)
            .finish()
    }
}

impl Reconciler {
    pub fn uncontrolled(manager: Manager, options: EditorOptions) -> Self {
        Self::with_mode(manager, options, Mode::Uncontrolled)
    }

    pub fn controlled(manager: Manager, options: EditorOptions) -> Self {
        Self::with_mode(manager, options, Mode::Controlled)
    }

    fn with_mode(manager: Manager, options: EditorOptions, mode: Mode) -> Self {
        Self {
            manager,
            mode,
            phase: Phase::Uninitialized,
            state: None,
            initial_content: options.initial_content,
            fallback_content: options.fallback_content,
            recovery_hook: options.recovery_hook,
            previous_selection: None,
            pending_focus: None,
            focused: false,
            on_change: None,
            on_state_change: None,
            on_focus: None,
            on_blur: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn state(&self) -> Option<&DocumentState> {
        self.state.as_ref()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn set_on_change(&mut self, f: impl FnMut(&ChangePayload<'_>) + 'static) {
        self.on_change = Some(Box::new(f));
    }

    pub fn set_on_state_change(&mut self, f: impl FnMut(&StateChangePayload<'_>) + 'static) {
        self.on_state_change = Some(Box::new(f));
    }

    pub fn set_on_focus(&mut self, f: impl FnMut(Selection) + 'static) {
        self.on_focus = Some(Box::new(f));
    }

    pub fn set_on_blur(&mut self, f: impl FnMut(Selection) + 'static) {
        self.on_blur = Some(Box::new(f));
    }

    /// Build the initial state from the configured content and enter `Idle`.
    /// The configured content is kept, so re-initializing after a teardown
    /// starts from the same document.
    pub fn init(&mut self) -> Result<(), ReconcileError> {
        let content = self.initial_content.clone();
        let doc = match content {
            Some(content) => self.doc_with_recovery(content)?,
            None => empty_doc(self.manager.schema()),
        };
        self.state = Some(DocumentState::new(doc, Arc::clone(self.manager.schema())));
        self.phase = Phase::Idle;
        log::debug!("reconciler initialized in {:?} mode", self.mode);
        Ok(())
    }

    /// The owning integration layer signals that the view has mounted.
    /// Deferred focus queued before this point is applied now.
    pub fn on_ready(&mut self) -> Result<(), ReconcileError> {
        if self.phase == Phase::Uninitialized {
            return Err(ReconcileError::Uninitialized);
        }
        self.flush_deferred_focus()?;
        Ok(())
    }

    /// Swap the extension set at runtime, migrating content when the
    /// resolved manager differs from the current one.
    pub fn on_reconfigure(&mut self, items: Vec<ManagerItem>) -> Result<(), ReconcileError> {
        let reconfigured = self.manager.reconfigure(items)?;
        if !self.manager.is_equal(&reconfigured.manager) {
            if let Some(state) = self.state.take() {
                self.state = Some(reconfigured.migrate(&state)?);
            }
            log::debug!("reconfigured with schema migration");
        }
        self.manager = reconfigured.manager;
        Ok(())
    }

    /// Drop state and listeners; the reconciler can be re-initialized.
    pub fn on_teardown(&mut self) {
        self.phase = Phase::Uninitialized;
        self.state = None;
        self.pending_focus = None;
        self.previous_selection = None;
        self.focused = false;
        self.on_change = None;
        self.on_state_change = None;
        self.on_focus = None;
        self.on_blur = None;
    }

    /// Apply (uncontrolled) or propose (controlled) a transaction.
    ///
    /// In controlled mode the canonical state does not change here; the
    /// candidate travels out through the `on_state_change` listener and the
    /// external owner decides what to [`Reconciler::submit_state`].
    pub fn dispatch(&mut self, transaction: &Transaction) -> Result<(), ReconcileError> {
        match self.phase {
            Phase::Uninitialized => return Err(ReconcileError::Uninitialized),
            Phase::ApplyingTransaction => return Err(ReconcileError::ReentrantDispatch),
            Phase::AwaitingExternalState => return Err(ReconcileError::AwaitingExternalState),
            Phase::Idle => {}
        }
        let old = self.state.take().ok_or(ReconcileError::Uninitialized)?;

        if old.schema().fingerprint() != self.manager.schema().fingerprint() {
            let err = ApplyError::SchemaMismatch {
                expected: self.manager.schema().fingerprint(),
                found: old.schema().fingerprint(),
            };
            self.state = Some(old);
            return Err(err.into());
        }

        self.phase = Phase::ApplyingTransaction;
        let applied = old.apply(transaction);
        let next = match applied {
            Ok(next) => next,
            Err(e) => {
                self.state = Some(old);
                self.phase = Phase::Idle;
                return Err(e.into());
            }
        };

        match self.mode {
            Mode::Uncontrolled => {
                log::trace!("applied transaction {}", transaction.id());
                if let Some(listener) = self.on_change.as_mut() {
                    listener(&ChangePayload {
                        old: &old,
                        new: &next,
                        transaction: Some(transaction),
                    });
                }
                self.state = Some(next);
                self.phase = Phase::Idle;
            }
            Mode::Controlled => {
                log::trace!("produced candidate for transaction {}", transaction.id());
                if let Some(listener) = self.on_state_change.as_mut() {
                    listener(&StateChangePayload {
                        old: &old,
                        candidate: &next,
                        transaction,
                        schema: self.manager.schema(),
                    });
                }
                // Candidate is dropped; canonical state is untouched until
                // the owner submits.
                self.state = Some(old);
                self.phase = Phase::AwaitingExternalState;
            }
        }
        Ok(())
    }

    /// External adoption path (controlled mode). Adopting a state equal to
    /// the current one is a no-op apart from leaving the awaiting phase.
    pub fn submit_state(&mut self, state: DocumentState) -> Result<(), ReconcileError> {
        if self.mode != Mode::Controlled {
            return Err(ReconcileError::NotControlled);
        }
        if self.phase == Phase::Uninitialized {
            return Err(ReconcileError::Uninitialized);
        }
        self.adopt(state, false);
        Ok(())
    }

    /// Replace the document wholesale. Not a transaction: bypasses
    /// controlled-mode candidate semantics and uses the adoption path.
    pub fn set_content(
        &mut self,
        content: Content,
        trigger_on_change: bool,
    ) -> Result<(), ReconcileError> {
        if self.phase == Phase::Uninitialized {
            return Err(ReconcileError::Uninitialized);
        }
        let doc = self.doc_with_recovery(content)?;
        let state = DocumentState::new(doc, Arc::clone(self.manager.schema()));
        self.adopt(state, trigger_on_change);
        Ok(())
    }

    /// Reset to the configured fallback content (empty default block when
    /// none was configured).
    pub fn clear_content(&mut self, trigger_on_change: bool) -> Result<(), ReconcileError> {
        let fallback = match self.fallback_content.clone() {
            Some(content) => content,
            None => Content::Doc(empty_doc(self.manager.schema())),
        };
        self.set_content(fallback, trigger_on_change)
    }

    /// Queue a focus request. Applied on the owner's next tick through
    /// [`Reconciler::flush_deferred_focus`]; a later request supersedes a
    /// pending one.
    pub fn focus(&mut self, target: impl Into<FocusTarget>) {
        let target = target.into();
        if target == FocusTarget::Ignore {
            return;
        }
        self.pending_focus = Some(target);
    }

    /// Apply the pending focus request, if any. Returns the selection that
    /// was applied.
    pub fn flush_deferred_focus(&mut self) -> Result<Option<Selection>, ReconcileError> {
        let Some(target) = self.pending_focus.take() else {
            return Ok(None);
        };
        let state = self.state.take().ok_or(ReconcileError::Uninitialized)?;
        let max = state.content_size();
        let selection = match target {
            FocusTarget::Start => Selection::cursor(0),
            FocusTarget::End => Selection::cursor(max),
            FocusTarget::At(at) => Selection::cursor(at.min(max)),
            FocusTarget::Range { from, to } => Selection::range(from, to).clamped(max),
            FocusTarget::Previous => self.previous_selection.unwrap_or(state.selection()),
            FocusTarget::Ignore => unreachable!("never queued"),
        };
        self.state = Some(state.with_selection(selection));
        self.focused = true;
        if let Some(listener) = self.on_focus.as_mut() {
            listener(selection);
        }
        Ok(Some(selection))
    }

    /// Drop focus, remembering the selection for `FocusTarget::Previous`.
    pub fn blur(&mut self) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        let selection = state.selection();
        self.previous_selection = Some(selection);
        self.focused = false;
        if let Some(listener) = self.on_blur.as_mut() {
            listener(selection);
        }
    }

    /// Run a registered command; `Ok(false)` means the command declined.
    pub fn run_command(&mut self, name: &str) -> Result<bool, ReconcileError> {
        let command = self
            .manager
            .command(name)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownCommand(name.to_string()))?;
        let state = self.state.as_ref().ok_or(ReconcileError::Uninitialized)?;
        match command.run(state) {
            Some(transaction) => {
                self.dispatch(&transaction)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run the merged keybinding chain for `combo` against the current state.
    pub fn handle_key(&self, combo: &str) -> Result<bool, ReconcileError> {
        let state = self.state.as_ref().ok_or(ReconcileError::Uninitialized)?;
        Ok(dispatch_key(self.manager.keymap(), combo, state))
    }

    /// Feed typed input through the input-rule pipeline; the first matching
    /// rule's transaction is dispatched.
    pub fn handle_text_input(&mut self, input: &str) -> Result<bool, ReconcileError> {
        let rules = self.manager.input_rules().to_vec();
        for rule in &rules {
            let state = self.state.as_ref().ok_or(ReconcileError::Uninitialized)?;
            if let Some(transaction) = rule.apply(state, input) {
                self.dispatch(&transaction)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn adopt(&mut self, state: DocumentState, trigger_on_change: bool) {
        let old = self.state.take();
        if let (true, Some(old), Some(listener)) =
            (trigger_on_change, old.as_ref(), self.on_change.as_mut())
        {
            listener(&ChangePayload {
                old,
                new: &state,
                transaction: None,
            });
        }
        self.state = Some(state);
        self.phase = Phase::Idle;
    }

    /// Content validation with the bounded recovery loop: on invalid JSON
    /// content, the hook transforms and we retry, up to the ceiling.
    fn doc_with_recovery(&mut self, content: Content) -> Result<Node, ReconcileError> {
        let schema = Arc::clone(self.manager.schema());
        let mut content = content;
        let mut attempts = 0;
        loop {
            match doc_from_content(&content, &schema) {
                Ok(doc) => return Ok(doc),
                Err(ReconcileError::InvalidContent(err)) => {
                    if attempts >= MAX_CONTENT_RETRIES {
                        return Err(err.into());
                    }
                    let Some(hook) = self.recovery_hook.as_mut() else {
                        return Err(err.into());
                    };
                    attempts += 1;
                    log::warn!(
                        "content invalid ({} block(s)); recovery attempt {attempts}",
                        err.invalid_blocks.len()
                    );
                    content = Content::Json(hook(&err));
                }
                Err(other) => return Err(other),
            }
        }
    }
}

fn doc_from_content(content: &Content, schema: &Arc<Schema>) -> Result<Node, ReconcileError> {
    match content {
        Content::Doc(node) => Ok(node.clone()),
        Content::Markup(markup) => Ok(from_markup(markup, schema)?),
        Content::Json(value) => Node::from_content(value, schema).map_err(|source| {
            let invalid_blocks = match &source {
                ContentError::InvalidBlocks { invalid_blocks } => invalid_blocks.clone(),
                ContentError::Malformed(_) => Vec::new(),
            };
            ReconcileError::InvalidContent(InvalidContentError {
                json: value.clone(),
                invalid_blocks,
                source,
            })
        }),
    }
}

/// A document containing one empty default block.
fn empty_doc(schema: &Schema) -> Node {
    Node::element(
        "doc",
        vec![Node::element(schema.default_block(), Vec::new())],
    )
}
