//! Extension resolution: turning an ordered list of extensions and presets
//! into one consistent, immutable manager snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use quillkit_model::{
    DocumentState, MarkSpec, MarkupError, NodeSpec, Schema, SchemaError, from_markup, to_markup,
};

use crate::keymap::{KeyHandler, merge_keybindings};

use super::{Command, Extension, ExtensionIdentity, InputRule, ManagerItem, ViewPlugin};

/// Which kind of schema contribution collided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionKind {
    Node,
    Mark,
}

impl fmt::Display for ContributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContributionKind::Node => f.write_str("node"),
            ContributionKind::Mark => f.write_str("mark"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Two extensions declared the same schema type at equal priority.
    /// (At different priorities the higher one wins silently; that is the
    /// documented override mechanism, not an error.)
    #[error(
        "extensions '{first_extension}' and '{second_extension}' both contribute \
         {kind} type '{type_name}' at equal priority"
    )]
    DuplicateSchemaContribution {
        kind: ContributionKind,
        type_name: String,
        first_extension: String,
        second_extension: String,
    },
    #[error("command '{name}' is declared by both '{first_extension}' and '{second_extension}'")]
    DuplicateCommandName {
        name: String,
        first_extension: String,
        second_extension: String,
    },
    /// The resolved schema has no block node to fall back to; most editing
    /// invariants depend on one existing.
    #[error("resolved schema contains no eligible default block node")]
    NoDefaultBlockType,
}

/// The resolved snapshot: one schema, one command set, one keybinding table,
/// one ordered plugin/input-rule pipeline.
///
/// Never mutated in place; reconfiguration produces a new manager.
#[derive(Debug, Clone)]
pub struct Manager {
    extensions: Vec<Extension>,
    identities: Vec<ExtensionIdentity>,
    schema: Arc<Schema>,
    commands: BTreeMap<String, Command>,
    keymap: BTreeMap<String, KeyHandler>,
    input_rules: Vec<InputRule>,
    view_plugins: Vec<ViewPlugin>,
}

impl Manager {
    /// Expand presets, order extensions by descending priority (stable, so
    /// declaration order breaks ties) and merge every contribution.
    pub fn resolve(items: Vec<ManagerItem>) -> Result<Manager, ResolveError> {
        let mut extensions: Vec<Extension> = Vec::new();
        for item in items {
            match item {
                ManagerItem::Extension(e) => extensions.push(e),
                ManagerItem::Preset(p) => extensions.extend(p.into_extensions()),
            }
        }

        // Stable sort keeps declaration order among equal priorities, which
        // is what makes resolution deterministic.
        extensions.sort_by_key(|e| std::cmp::Reverse(e.priority().value()));

        let mut seen = BTreeSet::new();
        extensions.retain(|e| {
            let fresh = seen.insert(e.name().to_string());
            if !fresh {
                log::debug!(
                    "dropping lower-priority duplicate of extension '{}'",
                    e.name()
                );
            }
            fresh
        });

        let (node_specs, mark_specs) = assemble_schema_contributions(&extensions)?;
        let schema = Schema::new(node_specs, mark_specs).map_err(|e| match e {
            SchemaError::NoDefaultBlock => ResolveError::NoDefaultBlockType,
        })?;

        let mut commands = BTreeMap::new();
        let mut command_owner: BTreeMap<String, String> = BTreeMap::new();
        for ext in &extensions {
            for (name, command) in ext.commands() {
                if let Some(first) = command_owner.get(name) {
                    return Err(ResolveError::DuplicateCommandName {
                        name: name.clone(),
                        first_extension: first.clone(),
                        second_extension: ext.name().to_string(),
                    });
                }
                command_owner.insert(name.clone(), ext.name().to_string());
                commands.insert(name.clone(), command.clone());
            }
        }

        let keymap = merge_keybindings(
            extensions
                .iter()
                .map(|e| e.keybindings().clone())
                .collect(),
        );

        // Pipelines preserve extension order; within an extension, each
        // contribution keeps its internal relative order.
        let mut input_rules = Vec::new();
        let mut view_plugins = Vec::new();
        for ext in &extensions {
            input_rules.extend(ext.input_rules().iter().cloned());
            view_plugins.extend(ext.view_plugins().iter().map(|name| ViewPlugin {
                name: name.clone(),
                extension: ext.name().to_string(),
            }));
        }

        let identities = extensions.iter().map(Extension::identity).collect();

        log::debug!(
            "resolved manager: {} extensions, {} commands, {} key combos, {} plugins",
            extensions.len(),
            commands.len(),
            keymap.len(),
            view_plugins.len(),
        );

        Ok(Manager {
            extensions,
            identities,
            schema,
            commands,
            keymap,
            input_rules,
            view_plugins,
        })
    }

    /// Structural equality over the sorted extension identity list.
    ///
    /// O(n) in the number of extensions: enough to decide "does this
    /// reconfiguration actually change behavior" without diffing the
    /// assembled schema or derived plugin objects.
    pub fn is_equal(&self, other: &Manager) -> bool {
        self.identities == other.identities
    }

    /// Resolve a new extension list for hot reconfiguration.
    ///
    /// Whenever [`Manager::is_equal`] reports `false` between the old and
    /// new manager, callers must run [`Reconfigured::migrate`] on their
    /// document state before applying further transactions.
    pub fn reconfigure(&self, items: Vec<ManagerItem>) -> Result<Reconfigured, ResolveError> {
        let manager = Manager::resolve(items)?;
        if self.is_equal(&manager) {
            log::debug!("reconfiguration resolved to an identical manager");
        }
        Ok(Reconfigured { manager })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn identities(&self) -> &[ExtensionIdentity] {
        &self.identities
    }

    pub fn commands(&self) -> &BTreeMap<String, Command> {
        &self.commands
    }

    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn keymap(&self) -> &BTreeMap<String, KeyHandler> {
        &self.keymap
    }

    pub fn input_rules(&self) -> &[InputRule] {
        &self.input_rules
    }

    pub fn view_plugins(&self) -> &[ViewPlugin] {
        &self.view_plugins
    }
}

fn assemble_schema_contributions(
    extensions: &[Extension],
) -> Result<(Vec<NodeSpec>, Vec<MarkSpec>), ResolveError> {
    let mut node_specs: Vec<NodeSpec> = Vec::new();
    let mut mark_specs: Vec<MarkSpec> = Vec::new();
    // type name -> every (priority, extension) that contributed it, winner
    // first. Losers are kept so an equal-priority pair is an error even when
    // a higher-priority extension already won the name.
    let mut node_contribs: BTreeMap<String, Vec<(i32, String)>> = BTreeMap::new();
    let mut mark_contribs: BTreeMap<String, Vec<(i32, String)>> = BTreeMap::new();

    for ext in extensions {
        let priority = ext.priority().value();
        for spec in ext.nodes() {
            let entries = node_contribs.entry(spec.name.clone()).or_default();
            if let Some((_, first)) = entries.iter().find(|(p, _)| *p == priority) {
                return Err(ResolveError::DuplicateSchemaContribution {
                    kind: ContributionKind::Node,
                    type_name: spec.name.clone(),
                    first_extension: first.clone(),
                    second_extension: ext.name().to_string(),
                });
            }
            match entries.first() {
                None => node_specs.push(spec.clone()),
                Some((_, winner)) => {
                    log::debug!(
                        "node '{}' from '{}' overridden by higher-priority '{}'",
                        spec.name,
                        ext.name(),
                        winner,
                    );
                }
            }
            entries.push((priority, ext.name().to_string()));
        }
        for spec in ext.marks() {
            let entries = mark_contribs.entry(spec.name.clone()).or_default();
            if let Some((_, first)) = entries.iter().find(|(p, _)| *p == priority) {
                return Err(ResolveError::DuplicateSchemaContribution {
                    kind: ContributionKind::Mark,
                    type_name: spec.name.clone(),
                    first_extension: first.clone(),
                    second_extension: ext.name().to_string(),
                });
            }
            match entries.first() {
                None => mark_specs.push(spec.clone()),
                Some((_, winner)) => {
                    log::debug!(
                        "mark '{}' from '{}' overridden by higher-priority '{}'",
                        spec.name,
                        ext.name(),
                        winner,
                    );
                }
            }
            entries.push((priority, ext.name().to_string()));
        }
    }

    Ok((node_specs, mark_specs))
}

/// Result of a hot reconfiguration: the new manager plus the migration path
/// that carries document content across the schema change.
#[derive(Debug, Clone)]
pub struct Reconfigured {
    pub manager: Manager,
}

impl Reconfigured {
    /// Serialize the document under its old schema and reparse it under the
    /// new one, clamping the selection into the migrated document.
    pub fn migrate(&self, old: &DocumentState) -> Result<DocumentState, MarkupError> {
        let markup = to_markup(old.doc(), old.schema());
        let doc = from_markup(&markup, self.manager.schema())?;
        let state = DocumentState::new(doc, Arc::clone(self.manager.schema()));
        Ok(state.with_selection(old.selection()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{Priority, bold_extension, core_preset};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn quote_extension(name: &str, priority: Priority) -> Extension {
        Extension::builder(name)
            .priority(priority)
            .node(NodeSpec::block("quote", "blockquote"))
            .build()
    }

    #[test]
    fn resolution_is_deterministic_for_equal_inputs() {
        let resolve = || {
            Manager::resolve(vec![core_preset().into(), bold_extension().into()]).unwrap()
        };
        let a = resolve();
        let b = resolve();
        assert!(a.is_equal(&b));
        assert_eq!(
            a.view_plugins().to_vec(),
            b.view_plugins().to_vec(),
        );
        assert_eq!(
            a.commands().keys().collect::<Vec<_>>(),
            b.commands().keys().collect::<Vec<_>>(),
        );
    }

    #[test]
    fn changing_one_option_breaks_equality() {
        let base = Manager::resolve(vec![core_preset().into(), bold_extension().into()]).unwrap();
        let tweaked = Manager::resolve(vec![
            core_preset().into(),
            Extension::builder("bold")
                .mark(MarkSpec::new("bold", "strong"))
                .options(json!({ "autoBold": true }))
                .build()
                .into(),
        ])
        .unwrap();
        assert!(!base.is_equal(&tweaked));
    }

    #[test]
    fn higher_priority_wins_schema_collisions_silently() {
        let manager = Manager::resolve(vec![
            core_preset().into(),
            quote_extension("fancy-quote", Priority::High).into(),
            Extension::builder("plain-quote")
                .priority(Priority::Low)
                .node(NodeSpec {
                    name: "quote".to_string(),
                    tag: "q".to_string(),
                    inline: false,
                    attrs: Default::default(),
                })
                .build()
                .into(),
        ])
        .unwrap();
        let spec = manager.schema().node("quote").unwrap();
        assert_eq!(spec.tag, "blockquote");
    }

    #[test]
    fn equal_priority_schema_collision_is_an_error() {
        let err = Manager::resolve(vec![
            core_preset().into(),
            quote_extension("quote-a", Priority::Custom(2)).into(),
            quote_extension("quote-b", Priority::Custom(2)).into(),
        ])
        .unwrap_err();
        match err {
            ResolveError::DuplicateSchemaContribution {
                kind,
                type_name,
                first_extension,
                second_extension,
            } => {
                assert_eq!(kind, ContributionKind::Node);
                assert_eq!(type_name, "quote");
                assert_eq!(first_extension, "quote-a");
                assert_eq!(second_extension, "quote-b");
            }
            other => panic!("expected DuplicateSchemaContribution, got {other:?}"),
        }
    }

    #[test]
    fn equal_priority_collision_below_the_winner_is_still_an_error() {
        // A higher-priority winner for "quote" does not license the two
        // lower-priority contributors to collide with each other.
        let err = Manager::resolve(vec![
            core_preset().into(),
            quote_extension("fancy-quote", Priority::High).into(),
            quote_extension("quote-a", Priority::Low).into(),
            quote_extension("quote-b", Priority::Low).into(),
        ])
        .unwrap_err();
        match err {
            ResolveError::DuplicateSchemaContribution {
                first_extension,
                second_extension,
                ..
            } => {
                assert_eq!(first_extension, "quote-a");
                assert_eq!(second_extension, "quote-b");
            }
            other => panic!("expected DuplicateSchemaContribution, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_command_names_are_an_error() {
        let command = || Command::new(|_| None);
        let err = Manager::resolve(vec![
            core_preset().into(),
            Extension::builder("a").command("doIt", command()).build().into(),
            Extension::builder("b").command("doIt", command()).build().into(),
        ])
        .unwrap_err();
        assert!(matches!(err, ResolveError::DuplicateCommandName { name, .. } if name == "doIt"));
    }

    #[test]
    fn schema_without_blocks_is_an_error() {
        let err = Manager::resolve(vec![
            Extension::builder("text-only")
                .node(NodeSpec::inline("emoji", "em-oji"))
                .build()
                .into(),
        ])
        .unwrap_err();
        assert!(matches!(err, ResolveError::NoDefaultBlockType));
    }

    #[test]
    fn plugin_pipeline_follows_priority_then_declaration_order() {
        let manager = Manager::resolve(vec![
            Extension::builder("low")
                .priority(Priority::Low)
                .node(NodeSpec::block("paragraph", "p"))
                .view_plugin("low-a")
                .view_plugin("low-b")
                .build()
                .into(),
            Extension::builder("high")
                .priority(Priority::High)
                .view_plugin("high-a")
                .build()
                .into(),
        ])
        .unwrap();
        let names: Vec<&str> = manager
            .view_plugins()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["high-a", "low-a", "low-b"]);
    }

    #[test]
    fn same_name_extensions_keep_the_higher_priority_one() {
        let manager = Manager::resolve(vec![
            core_preset().into(),
            Extension::builder("dup")
                .priority(Priority::Low)
                .options(json!("low"))
                .build()
                .into(),
            Extension::builder("dup")
                .priority(Priority::High)
                .options(json!("high"))
                .build()
                .into(),
        ])
        .unwrap();
        let dup = manager
            .identities()
            .iter()
            .find(|i| i.name == "dup")
            .unwrap();
        assert_eq!(dup.options, json!("high"));
    }

    #[test]
    fn reconfigure_migrates_content_across_schemas() {
        let manager = Manager::resolve(vec![core_preset().into()]).unwrap();
        let doc = from_markup("<p>Hello</p>", manager.schema()).unwrap();
        let state = DocumentState::new(doc, Arc::clone(manager.schema()));

        let reconfigured = manager
            .reconfigure(vec![core_preset().into(), bold_extension().into()])
            .unwrap();
        assert!(!manager.is_equal(&reconfigured.manager));

        let migrated = reconfigured.migrate(&state).unwrap();
        assert_eq!(migrated.doc().text_content(), "Hello");
        assert_eq!(
            migrated.schema().fingerprint(),
            reconfigured.manager.schema().fingerprint()
        );
    }
}
