//! Extensions, presets and the manager that resolves them.
//!
//! An [`Extension`] is an independently-authored contribution to the editor:
//! schema fragments, commands, keybindings, input rules and view plugins,
//! all carried under one name and priority. A [`Preset`] bundles extensions
//! for reuse. [`Manager::resolve`] merges a list of either into a single
//! consistent snapshot; see the `manager` submodule.

mod builtin;
mod manager;

pub use builtin::{bold_extension, core_preset, doc_extension, paragraph_extension, text_extension};
pub use manager::{ContributionKind, Manager, Reconfigured, ResolveError};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use quillkit_model::{DocumentState, MarkSpec, NodeSpec, Transaction};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::keymap::KeyHandler;

/// Resolution priority. Higher values win schema collisions and run earlier
/// in keybinding chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Lowest,
    Low,
    Default,
    Medium,
    High,
    Highest,
    Custom(i32),
}

impl Priority {
    pub const fn value(self) -> i32 {
        match self {
            Priority::Lowest => 0,
            Priority::Low => 250,
            Priority::Default => 500,
            Priority::Medium => 750,
            Priority::High => 1000,
            Priority::Highest => 1250,
            Priority::Custom(v) => v,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Default
    }
}

/// A named command: given the current state, either produces a transaction
/// or declines.
#[derive(Clone)]
pub struct Command(Arc<dyn Fn(&DocumentState) -> Option<Transaction>>);

impl Command {
    pub fn new(f: impl Fn(&DocumentState) -> Option<Transaction> + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn run(&self, state: &DocumentState) -> Option<Transaction> {
        (self.0)(state)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Command")
    }
}

/// A text input rule: when typed input matches the trigger pattern, the
/// handler may produce a transforming transaction.
#[derive(Clone)]
pub struct InputRule {
    trigger: Regex,
    handler: Arc<dyn Fn(&DocumentState, &regex::Captures<'_>) -> Option<Transaction>>,
}

impl InputRule {
    pub fn new(
        pattern: &str,
        handler: impl Fn(&DocumentState, &regex::Captures<'_>) -> Option<Transaction> + 'static,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            trigger: Regex::new(pattern)?,
            handler: Arc::new(handler),
        })
    }

    pub fn trigger(&self) -> &Regex {
        &self.trigger
    }

    /// Try this rule against `input`, producing a transaction on a match.
    pub fn apply(&self, state: &DocumentState, input: &str) -> Option<Transaction> {
        let caps = self.trigger.captures(input)?;
        (self.handler)(state, &caps)
    }
}

impl fmt::Debug for InputRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputRule")
            .field("trigger", &self.trigger.as_str())
            .finish()
    }
}

/// A view-level plugin slot in the resolved pipeline. The view collaborator
/// interprets the name; the core only guarantees ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewPlugin {
    pub name: String,
    /// Name of the extension that contributed this plugin.
    pub extension: String,
}

/// The identity of an extension for structural comparison: everything that
/// determines resolved behavior except the (uncomparable) function values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionIdentity {
    pub name: String,
    pub priority: Priority,
    pub options: serde_json::Value,
}

/// One pluggable contribution to the editor. Immutable once built; identified
/// by name within a manager.
#[derive(Clone)]
pub struct Extension {
    name: String,
    priority: Priority,
    options: serde_json::Value,
    nodes: Vec<NodeSpec>,
    marks: Vec<MarkSpec>,
    commands: BTreeMap<String, Command>,
    keybindings: BTreeMap<String, KeyHandler>,
    input_rules: Vec<InputRule>,
    view_plugins: Vec<String>,
}

impl Extension {
    pub fn builder(name: impl Into<String>) -> ExtensionBuilder {
        ExtensionBuilder {
            extension: Extension {
                name: name.into(),
                priority: Priority::Default,
                options: serde_json::Value::Null,
                nodes: Vec::new(),
                marks: Vec::new(),
                commands: BTreeMap::new(),
                keybindings: BTreeMap::new(),
                input_rules: Vec::new(),
                view_plugins: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn options(&self) -> &serde_json::Value {
        &self.options
    }

    pub fn identity(&self) -> ExtensionIdentity {
        ExtensionIdentity {
            name: self.name.clone(),
            priority: self.priority,
            options: self.options.clone(),
        }
    }

    pub(crate) fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub(crate) fn marks(&self) -> &[MarkSpec] {
        &self.marks
    }

    pub(crate) fn commands(&self) -> &BTreeMap<String, Command> {
        &self.commands
    }

    pub(crate) fn keybindings(&self) -> &BTreeMap<String, KeyHandler> {
        &self.keybindings
    }

    pub(crate) fn input_rules(&self) -> &[InputRule] {
        &self.input_rules
    }

    pub(crate) fn view_plugins(&self) -> &[String] {
        &self.view_plugins
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("nodes", &self.nodes.len())
            .field("marks", &self.marks.len())
            .field("commands", &self.commands.len())
            .field("keybindings", &self.keybindings.len())
            .finish()
    }
}

pub struct ExtensionBuilder {
    extension: Extension,
}

impl ExtensionBuilder {
    pub fn priority(mut self, priority: Priority) -> Self {
        self.extension.priority = priority;
        self
    }

    /// Options participate in structural equality between managers; two
    /// resolutions differing only in an option value compare unequal.
    pub fn options(mut self, options: serde_json::Value) -> Self {
        self.extension.options = options;
        self
    }

    pub fn node(mut self, spec: NodeSpec) -> Self {
        self.extension.nodes.push(spec);
        self
    }

    pub fn mark(mut self, spec: MarkSpec) -> Self {
        self.extension.marks.push(spec);
        self
    }

    pub fn command(mut self, name: impl Into<String>, command: Command) -> Self {
        self.extension.commands.insert(name.into(), command);
        self
    }

    pub fn keybinding(mut self, combo: impl Into<String>, handler: KeyHandler) -> Self {
        self.extension.keybindings.insert(combo.into(), handler);
        self
    }

    pub fn input_rule(mut self, rule: InputRule) -> Self {
        self.extension.input_rules.push(rule);
        self
    }

    pub fn view_plugin(mut self, name: impl Into<String>) -> Self {
        self.extension.view_plugins.push(name.into());
        self
    }

    pub fn build(self) -> Extension {
        self.extension
    }
}

/// A named, reusable bundle of extensions. Expands into its members at
/// resolution time.
#[derive(Debug, Clone)]
pub struct Preset {
    name: String,
    extensions: Vec<Extension>,
}

impl Preset {
    pub fn new(name: impl Into<String>, extensions: Vec<Extension>) -> Self {
        Self {
            name: name.into(),
            extensions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_extensions(self) -> Vec<Extension> {
        self.extensions
    }
}

/// What callers hand to [`Manager::resolve`].
#[derive(Debug, Clone)]
pub enum ManagerItem {
    Extension(Extension),
    Preset(Preset),
}

impl From<Extension> for ManagerItem {
    fn from(e: Extension) -> Self {
        ManagerItem::Extension(e)
    }
}

impl From<Preset> for ManagerItem {
    fn from(p: Preset) -> Self {
        ManagerItem::Preset(p)
    }
}
