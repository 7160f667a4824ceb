//! End-to-end scenarios across extension resolution, reconciliation,
//! keybindings and positioning, as an integration layer would exercise them.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use rstest::rstest;

use quillkit_core::extension::{bold_extension, core_preset};
use quillkit_core::{
    AnchorRect, Content, EditorOptions, Extension, FocusTarget, KeyHandler, Manager,
    PositionerRegistry, Reconciler, ResolveError, SelectionPositioner, dispatch_key,
    merge_keybindings,
};
use quillkit_model::{
    DocumentState, Node, NodeSpec, Selection, StatePair, Transaction, from_markup,
};

fn core_manager() -> Manager {
    Manager::resolve(vec![core_preset().into()]).unwrap()
}

#[test]
fn hot_reconfiguration_preserves_text() {
    // Start with [Doc, Paragraph, Text] and "<p>Hello</p>".
    let manager = core_manager();
    let doc = from_markup("<p>Hello</p>", manager.schema()).unwrap();
    let state = DocumentState::new(doc, Arc::clone(manager.schema()));

    // Add Bold and migrate.
    let reconfigured = manager
        .reconfigure(vec![core_preset().into(), bold_extension().into()])
        .unwrap();
    assert!(!manager.is_equal(&reconfigured.manager));

    let migrated = reconfigured.migrate(&state).unwrap();
    assert_eq!(migrated.doc().text_content(), "Hello");

    // The migrated state accepts transactions under the new schema.
    let next = migrated
        .apply(&Transaction::internal().insert_text(6, " world"))
        .unwrap();
    assert_eq!(next.doc().text_content(), "Hello world");
}

#[test]
fn narrowing_reconfiguration_keeps_text_from_dropped_node_types() {
    let wide = Manager::resolve(vec![
        core_preset().into(),
        Extension::builder("quote")
            .node(NodeSpec::block("quote", "blockquote"))
            .build()
            .into(),
    ])
    .unwrap();
    let doc = from_markup("<blockquote><p>kept</p></blockquote>", wide.schema()).unwrap();
    let state = DocumentState::new(doc, Arc::clone(wide.schema()));

    // Dropping the quote extension unwraps its nodes instead of losing text.
    let narrowed = wide.reconfigure(vec![core_preset().into()]).unwrap();
    let migrated = narrowed.migrate(&state).unwrap();
    assert_eq!(migrated.doc().text_content(), "kept");
}

#[test]
fn resolving_the_same_extension_list_twice_is_equal() {
    let a = Manager::resolve(vec![core_preset().into(), bold_extension().into()]).unwrap();
    let b = Manager::resolve(vec![core_preset().into(), bold_extension().into()]).unwrap();
    assert!(a.is_equal(&b));
    assert_eq!(a.schema().fingerprint(), b.schema().fingerprint());
}

#[test]
fn duplicate_schema_contribution_at_equal_priority_raises() {
    let quote = |name: &str| {
        Extension::builder(name)
            .priority(quillkit_core::Priority::Custom(2))
            .node(NodeSpec::block("quote", "blockquote"))
            .build()
    };
    let err = Manager::resolve(vec![
        core_preset().into(),
        quote("a").into(),
        quote("b").into(),
    ])
    .unwrap_err();
    assert!(matches!(
        err,
        ResolveError::DuplicateSchemaContribution { .. }
    ));
}

#[test]
fn controlled_reconciler_defers_entirely_to_its_owner() {
    let mut reconciler = Reconciler::controlled(
        core_manager(),
        EditorOptions {
            initial_content: Some(Content::Markup("<p>Hello</p>".to_string())),
            ..Default::default()
        },
    );
    reconciler.init().unwrap();

    let outbox: Rc<RefCell<Option<DocumentState>>> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&outbox);
    reconciler.set_on_state_change(move |payload| {
        *sink.borrow_mut() = Some(payload.candidate.clone());
    });

    reconciler
        .dispatch(&Transaction::internal().insert_text(6, "!"))
        .unwrap();
    // The owner saw a candidate, the reconciler kept its canonical state.
    assert_eq!(reconciler.state().unwrap().doc().text_content(), "Hello");

    let candidate = outbox.borrow_mut().take().unwrap();
    reconciler.submit_state(candidate).unwrap();
    assert_eq!(reconciler.state().unwrap().doc().text_content(), "Hello!");
}

#[rstest]
#[case(FocusTarget::At(9999), 10)]
#[case(FocusTarget::End, 10)]
#[case(FocusTarget::At(3), 3)]
fn focus_offsets_clamp_to_the_document(#[case] target: FocusTarget, #[case] expected: usize) {
    // Two paragraphs of 3 chars each: content size (2 + 3) * 2 = 10.
    let mut reconciler = Reconciler::uncontrolled(
        core_manager(),
        EditorOptions {
            initial_content: Some(Content::Markup("<p>abc</p><p>def</p>".to_string())),
            ..Default::default()
        },
    );
    reconciler.init().unwrap();
    assert_eq!(reconciler.state().unwrap().content_size(), 10);

    reconciler.focus(target);
    let applied = reconciler.flush_deferred_focus().unwrap().unwrap();
    assert_eq!(applied, Selection::cursor(expected));
}

#[test]
fn keybindings_from_separate_extensions_chain_by_priority() {
    let order = Rc::new(RefCell::new(Vec::new()));

    let handler = |log: &Rc<RefCell<Vec<&'static str>>>, label: &'static str, handled: bool| {
        let log = Rc::clone(log);
        KeyHandler::new(move |ctx| {
            log.borrow_mut().push(label);
            if handled { true } else { ctx.next() }
        })
    };

    // Index 0 = highest priority, as the manager produces them.
    let merged = merge_keybindings(vec![
        BTreeMap::from([("Enter".to_string(), handler(&order, "first", false))]),
        BTreeMap::from([("Enter".to_string(), handler(&order, "second", true))]),
    ]);

    let manager = core_manager();
    let doc = from_markup("<p>x</p>", manager.schema()).unwrap();
    let state = DocumentState::new(doc, Arc::clone(manager.schema()));

    assert!(dispatch_key(&merged, "Enter", &state));
    assert_eq!(*order.borrow(), vec!["first", "second"]);
}

#[test]
fn selection_menu_positioning_across_an_editing_session() {
    let mut reconciler = Reconciler::uncontrolled(
        core_manager(),
        EditorOptions {
            initial_content: Some(Content::Markup("<p>Hello world</p>".to_string())),
            ..Default::default()
        },
    );
    reconciler.init().unwrap();

    let mut registry = PositionerRegistry::new();
    registry.register_anchor(
        "selection-menu",
        AnchorRect {
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 20.0,
        },
    );

    // User selects a range: the menu activates.
    let idle = reconciler.state().unwrap().clone();
    reconciler.focus(FocusTarget::Range { from: 1, to: 6 });
    reconciler.flush_deferred_focus().unwrap();
    let selected = reconciler.state().unwrap().clone();

    let active = registry.recompute(
        "selection-menu",
        &SelectionPositioner,
        &StatePair::new(&idle, &selected),
    );
    assert!(active.active);

    // Collapse the selection: the menu fades out at its last position.
    reconciler.focus(FocusTarget::Start);
    reconciler.flush_deferred_focus().unwrap();
    let collapsed = reconciler.state().unwrap().clone();

    let fading = registry.recompute(
        "selection-menu",
        &SelectionPositioner,
        &StatePair::new(&selected, &collapsed),
    );
    assert!(!fading.active);
    assert_eq!((fading.x, fading.y), (active.x, active.y));

    // Nothing changed since: memoized props come back identically.
    let settled = registry.recompute(
        "selection-menu",
        &SelectionPositioner,
        &StatePair::new(&collapsed, &collapsed),
    );
    assert_eq!(settled, fading);
}

#[test]
fn a_full_uncontrolled_session_with_reconfiguration() {
    let mut reconciler = Reconciler::uncontrolled(
        core_manager(),
        EditorOptions {
            initial_content: Some(Content::Markup("<p>Hello</p>".to_string())),
            ..Default::default()
        },
    );
    reconciler.init().unwrap();
    reconciler.on_ready().unwrap();

    // Type, then select-and-delete via the built-in command.
    reconciler
        .dispatch(&Transaction::internal().insert_text(6, "!!"))
        .unwrap();
    reconciler.focus(FocusTarget::Range { from: 6, to: 8 });
    reconciler.flush_deferred_focus().unwrap();
    assert!(reconciler.run_command("deleteSelection").unwrap());
    assert_eq!(reconciler.state().unwrap().doc().text_content(), "Hello");

    // Hot-add bold; editing continues against the migrated state.
    reconciler
        .on_reconfigure(vec![core_preset().into(), bold_extension().into()])
        .unwrap();
    assert!(reconciler.handle_key("Mod-b").unwrap());
    reconciler
        .dispatch(&Transaction::internal().insert_text(6, "?"))
        .unwrap();
    assert_eq!(reconciler.state().unwrap().doc().text_content(), "Hello?");

    reconciler.on_teardown();
    assert!(reconciler.state().is_none());
}

#[test]
fn markup_round_trip_under_a_superset_schema() {
    let small = core_manager();
    let doc = Node::element(
        "doc",
        vec![Node::element(
            "paragraph",
            vec![Node::text("a < b & c")],
        )],
    );
    let markup = quillkit_model::to_markup(&doc, small.schema());

    let large = Manager::resolve(vec![core_preset().into(), bold_extension().into()]).unwrap();
    assert!(large.schema().is_superset_of(small.schema()));
    let reparsed = from_markup(&markup, large.schema()).unwrap();
    assert_eq!(reparsed.text_content(), "a < b & c");
}
