//! Keybinding merging.
//!
//! Each extension contributes its own keybinding map. Merging builds, for
//! every distinct key combination, a chain of all registered handlers in
//! priority order. The merged handler runs the head of the chain and hands
//! it a continuation: a handler may return `true` (handled, stop), call
//! [`KeyContext::next`] and return its result (pass through), or return
//! `false` without calling `next` (stop, not handled — lower-priority
//! handlers are deliberately not attempted).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use quillkit_model::DocumentState;

/// A handler bound to a key combination.
#[derive(Clone)]
pub struct KeyHandler(Arc<dyn Fn(&mut KeyContext<'_>) -> bool>);

impl KeyHandler {
    pub fn new(f: impl Fn(&mut KeyContext<'_>) -> bool + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn call(&self, ctx: &mut KeyContext<'_>) -> bool {
        (self.0)(ctx)
    }
}

impl fmt::Debug for KeyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyHandler")
    }
}

/// What a handler sees while running: the current document state and the
/// remainder of its chain.
pub struct KeyContext<'a> {
    state: &'a DocumentState,
    rest: &'a [KeyHandler],
}

impl KeyContext<'_> {
    pub fn state(&self) -> &DocumentState {
        self.state
    }

    /// Run the remaining (lower-priority) handlers and return their result.
    ///
    /// Consumes the remainder: calling `next` twice runs nothing the second
    /// time and returns `false`. An exhausted chain also returns `false`.
    pub fn next(&mut self) -> bool {
        let rest = std::mem::take(&mut self.rest);
        run_chain(rest, self.state)
    }
}

fn run_chain(chain: &[KeyHandler], state: &DocumentState) -> bool {
    match chain.split_first() {
        None => false,
        Some((head, rest)) => {
            let mut ctx = KeyContext { state, rest };
            head.call(&mut ctx)
        }
    }
}

/// Merge per-extension keybinding maps into one dispatch table.
///
/// `maps` must be ordered by extension priority, index 0 highest. Key
/// combinations nobody declared get no entry.
pub fn merge_keybindings(
    maps: Vec<BTreeMap<String, KeyHandler>>,
) -> BTreeMap<String, KeyHandler> {
    let mut chains: BTreeMap<String, Vec<KeyHandler>> = BTreeMap::new();
    for map in maps {
        for (combo, handler) in map {
            chains.entry(combo).or_default().push(handler);
        }
    }
    chains
        .into_iter()
        .map(|(combo, chain)| {
            let merged = KeyHandler::new(move |ctx: &mut KeyContext<'_>| {
                run_chain(&chain, ctx.state())
            });
            (combo, merged)
        })
        .collect()
}

/// Run the merged handler for `combo`, if any. Returns whether the key was
/// handled.
pub fn dispatch_key(
    keymap: &BTreeMap<String, KeyHandler>,
    combo: &str,
    state: &DocumentState,
) -> bool {
    match keymap.get(combo) {
        Some(handler) => {
            let mut ctx = KeyContext { state, rest: &[] };
            handler.call(&mut ctx)
        }
        None => false,
    }
}
