//! Floating-UI positioning, memoized against state changes.
//!
//! A positioner is a pure function family over a `{previous, current}` state
//! pair plus a registered anchor rectangle. The registry owns one record per
//! positioner id and only recomputes when the positioner reports a relevant
//! change, so an editor with many positioners pays nothing per keystroke for
//! the inactive ones. When a positioner deactivates, its last geometry is
//! kept so the floating element fades out in place instead of snapping back
//! to its initial position.

use std::collections::HashMap;

use quillkit_model::StatePair;

use crate::compare;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Geometry of the registered anchor element, in the view's coordinate
/// space. Stands in for whatever the rendering collaborator measures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl AnchorRect {
    /// The point just under the anchor's left edge, where floating menus
    /// conventionally open.
    pub fn below_left(&self) -> Point {
        Point {
            x: self.x,
            y: self.y + self.height,
        }
    }
}

/// What the view spreads onto a floating element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionerProps {
    pub active: bool,
    pub x: f64,
    pub y: f64,
}

/// A positioning strategy. All methods are pure functions of their inputs.
pub trait Positioner {
    /// Where the floating element sits before any position was computed.
    fn initial_position(&self) -> Point {
        Point::default()
    }

    /// Whether the state change is relevant to this positioner at all.
    /// Returning `false` short-circuits everything else.
    fn has_changed(&self, pair: &StatePair<'_>) -> bool;

    /// Whether the floating element should be visible for this state.
    fn is_active(&self, pair: &StatePair<'_>, anchor: &AnchorRect) -> bool;

    /// The position to show the floating element at. Only called when
    /// active.
    fn position(&self, pair: &StatePair<'_>, anchor: &AnchorRect) -> Point;
}

/// Follows a non-collapsed selection: active while a range is selected,
/// positioned under the anchor, offset by the selection head.
#[derive(Debug, Default)]
pub struct SelectionPositioner;

impl Positioner for SelectionPositioner {
    fn has_changed(&self, pair: &StatePair<'_>) -> bool {
        compare::state_changed(pair)
    }

    fn is_active(&self, pair: &StatePair<'_>, _anchor: &AnchorRect) -> bool {
        !pair.new.selection().is_collapsed()
    }

    fn position(&self, pair: &StatePair<'_>, anchor: &AnchorRect) -> Point {
        let base = anchor.below_left();
        Point {
            x: base.x + pair.new.selection().head as f64,
            y: base.y,
        }
    }
}

/// Per-positioner record: the anchor the view registered and the last
/// computed props. Created by anchor registration, lives until explicitly
/// evicted.
#[derive(Debug, Clone, Copy)]
struct Registration {
    anchor: AnchorRect,
    previous: Option<PositionerProps>,
}

/// Arena of positioner registrations, keyed by stable id. Registration and
/// eviction are explicit operations owned by the integration layer.
#[derive(Debug, Default)]
pub struct PositionerRegistry {
    entries: HashMap<String, Registration>,
}

impl PositionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the measured anchor for `id`. Re-registering
    /// keeps the memoized props.
    pub fn register_anchor(&mut self, id: impl Into<String>, anchor: AnchorRect) {
        self.entries
            .entry(id.into())
            .and_modify(|r| r.anchor = anchor)
            .or_insert(Registration {
                anchor,
                previous: None,
            });
    }

    /// Drop the registration when the owning UI unmounts.
    pub fn evict(&mut self, id: &str) {
        self.entries.remove(id);
    }

    /// Compute the props for one positioner against a state pair.
    ///
    /// Memoization rules, in order:
    /// - no anchor registered: inactive initial position, positioner
    ///   functions untouched;
    /// - `has_changed` is false: the memoized previous props, identically;
    /// - active: fresh position, memoized;
    /// - newly inactive: last geometry with `active: false`, memoized;
    /// - still inactive: the memoized previous props.
    pub fn recompute(
        &mut self,
        id: &str,
        positioner: &dyn Positioner,
        pair: &StatePair<'_>,
    ) -> PositionerProps {
        // Records are created by anchor registration only; recomputing an
        // unregistered id must not grow the arena.
        let Some(entry) = self.entries.get_mut(id) else {
            let initial = positioner.initial_position();
            return PositionerProps {
                active: false,
                x: initial.x,
                y: initial.y,
            };
        };
        let anchor = entry.anchor;

        if let Some(previous) = entry.previous {
            if !positioner.has_changed(pair) {
                log::trace!("positioner '{id}': unchanged, memoized props returned");
                return previous;
            }
        }

        let props = if positioner.is_active(pair, &anchor) {
            let point = positioner.position(pair, &anchor);
            PositionerProps {
                active: true,
                x: point.x,
                y: point.y,
            }
        } else if let Some(previous) = entry.previous {
            // Deactivation keeps the last geometry so the element fades out
            // where it was.
            PositionerProps {
                active: false,
                ..previous
            }
        } else {
            let initial = positioner.initial_position();
            PositionerProps {
                active: false,
                x: initial.x,
                y: initial.y,
            }
        };

        entry.previous = Some(props);
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quillkit_model::{
        DocumentState, Node, NodeSpec, Schema, Selection, StatePair, Transaction,
    };
    use std::sync::Arc;

    fn state(text: &str) -> DocumentState {
        let schema = Schema::new(vec![NodeSpec::block("paragraph", "p")], vec![]).unwrap();
        let doc = Node::element(
            "doc",
            vec![Node::element("paragraph", vec![Node::text(text)])],
        );
        DocumentState::new(doc, Arc::clone(&schema))
    }

    fn anchor() -> AnchorRect {
        AnchorRect {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 30.0,
        }
    }

    /// A positioner that must never be consulted.
    struct Untouchable;

    impl Positioner for Untouchable {
        fn initial_position(&self) -> Point {
            Point { x: 1.0, y: 2.0 }
        }
        fn has_changed(&self, _: &StatePair<'_>) -> bool {
            panic!("has_changed called without an anchor")
        }
        fn is_active(&self, _: &StatePair<'_>, _: &AnchorRect) -> bool {
            panic!("is_active called without an anchor")
        }
        fn position(&self, _: &StatePair<'_>, _: &AnchorRect) -> Point {
            panic!("position called without an anchor")
        }
    }

    #[test]
    fn no_anchor_returns_inactive_initial_without_calling_the_positioner() {
        let mut registry = PositionerRegistry::new();
        let s = state("Hello");
        let pair = StatePair::new(&s, &s);
        let props = registry.recompute("menu", &Untouchable, &pair);
        assert_eq!(
            props,
            PositionerProps {
                active: false,
                x: 1.0,
                y: 2.0
            }
        );
    }

    #[test]
    fn active_selection_produces_a_fresh_position() {
        let mut registry = PositionerRegistry::new();
        registry.register_anchor("menu", anchor());

        let old = state("Hello");
        let new = old.with_selection(Selection::range(2, 5));
        let props = registry.recompute("menu", &SelectionPositioner, &StatePair::new(&old, &new));
        assert_eq!(
            props,
            PositionerProps {
                active: true,
                x: 15.0,
                y: 50.0
            }
        );
    }

    #[test]
    fn unchanged_state_returns_the_memoized_props_identically() {
        let mut registry = PositionerRegistry::new();
        registry.register_anchor("menu", anchor());

        let old = state("Hello");
        let new = old.with_selection(Selection::range(2, 5));
        let pair = StatePair::new(&old, &new);
        let first = registry.recompute("menu", &SelectionPositioner, &pair);

        // Second call with an unchanged pair short-circuits on has_changed.
        let settled = StatePair::new(&new, &new);
        let second = registry.recompute("menu", &SelectionPositioner, &settled);
        assert_eq!(first, second);
    }

    #[test]
    fn deactivation_keeps_the_last_geometry() {
        let mut registry = PositionerRegistry::new();
        registry.register_anchor("menu", anchor());

        let old = state("Hello");
        let selected = old.with_selection(Selection::range(2, 5));
        let active =
            registry.recompute("menu", &SelectionPositioner, &StatePair::new(&old, &selected));
        assert!(active.active);

        let collapsed = selected.with_selection(Selection::cursor(5));
        let fading = registry.recompute(
            "menu",
            &SelectionPositioner,
            &StatePair::new(&selected, &collapsed),
        );
        assert_eq!(
            fading,
            PositionerProps {
                active: false,
                x: active.x,
                y: active.y
            }
        );

        // Still inactive on the next relevant change: memoized value again.
        let moved = collapsed
            .apply(&Transaction::internal().set_selection(1, 1))
            .unwrap();
        let still = registry.recompute(
            "menu",
            &SelectionPositioner,
            &StatePair::new(&collapsed, &moved),
        );
        assert_eq!(still, fading);
    }

    #[test]
    fn first_computation_while_inactive_uses_the_initial_position() {
        let mut registry = PositionerRegistry::new();
        registry.register_anchor("menu", anchor());

        let old = state("Hello");
        let new = old.with_selection(Selection::cursor(1));
        let props =
            registry.recompute("menu", &SelectionPositioner, &StatePair::new(&old, &new));
        assert_eq!(
            props,
            PositionerProps {
                active: false,
                x: 0.0,
                y: 0.0
            }
        );
    }

    #[test]
    fn eviction_forgets_anchor_and_memoized_props() {
        let mut registry = PositionerRegistry::new();
        registry.register_anchor("menu", anchor());
        registry.evict("menu");

        let s = state("Hello");
        let props = registry.recompute("menu", &Untouchable, &StatePair::new(&s, &s));
        assert!(!props.active);
    }

    #[test]
    fn recomputing_unregistered_ids_does_not_grow_the_arena() {
        let mut registry = PositionerRegistry::new();
        let s = state("Hello");
        let pair = StatePair::new(&s, &s);
        for i in 0..100 {
            registry.recompute(&format!("ghost-{i}"), &Untouchable, &pair);
        }
        assert!(registry.entries.is_empty());

        registry.register_anchor("menu", anchor());
        assert_eq!(registry.entries.len(), 1);
    }
}
