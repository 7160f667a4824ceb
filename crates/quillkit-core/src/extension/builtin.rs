//! The built-in extensions every editor starts from.
//!
//! These are deliberately small: a root, a paragraph, plain text, and bold.
//! They double as the reference for how third-party extensions are written.

use quillkit_model::{MarkSpec, NodeSpec, Transaction};

use super::{Command, Extension, InputRule, Preset, Priority};
use crate::keymap::KeyHandler;

/// The document root. Contributed at the highest priority so a user
/// extension overriding `doc` must do so explicitly.
pub fn doc_extension() -> Extension {
    Extension::builder("doc")
        .priority(Priority::Highest)
        .node(NodeSpec {
            name: "doc".to_string(),
            tag: String::new(),
            inline: false,
            attrs: Default::default(),
        })
        .build()
}

/// Plain text leaves.
pub fn text_extension() -> Extension {
    Extension::builder("text")
        .priority(Priority::Highest)
        .node(NodeSpec {
            name: "text".to_string(),
            tag: String::new(),
            inline: true,
            attrs: Default::default(),
        })
        .build()
}

/// Paragraph blocks, plus the editing primitives that assume one exists:
/// `deleteSelection` and the `--` to em dash input rule.
pub fn paragraph_extension() -> Extension {
    let delete_selection = Command::new(|state| {
        let sel = state.selection();
        if sel.is_collapsed() {
            return None;
        }
        Some(
            Transaction::internal()
                .delete_range(sel.from(), sel.to())
                .set_selection(sel.from(), sel.from()),
        )
    });

    let em_dash = InputRule::new(r"--$", |state, _| {
        let head = state.selection().head;
        if head < 2 {
            return None;
        }
        Some(
            Transaction::internal()
                .delete_range(head - 2, head)
                .insert_text(head - 2, "\u{2014}"),
        )
    })
    .expect("em dash pattern is valid");

    Extension::builder("paragraph")
        .node(NodeSpec::block("paragraph", "p"))
        .command("deleteSelection", delete_selection)
        .input_rule(em_dash)
        .build()
}

/// Bold marks with the conventional keybinding.
pub fn bold_extension() -> Extension {
    Extension::builder("bold")
        .mark(MarkSpec::new("bold", "strong"))
        .keybinding("Mod-b", KeyHandler::new(|_| true))
        .view_plugin("bold-toolbar-button")
        .build()
}

/// The minimal working editor: root, paragraph and text.
pub fn core_preset() -> Preset {
    Preset::new(
        "core",
        vec![doc_extension(), paragraph_extension(), text_extension()],
    )
}
