//! The integration surface a view-rendering collaborator mounts against.
//!
//! The core never touches a UI tree; instead the view asks a [`Frame`] for
//! root props once per render cycle and mounts whatever they describe. The
//! once-per-cycle rule exists because root props claim the anchor element:
//! two claimants in one cycle means two components fighting over the same
//! editor root, which is a programmer error that should fail loudly.

use serde::Serialize;

/// Role a frame plays in the UI tree. Closed set; integrations match
/// exhaustively instead of inspecting runtime tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameRole {
    /// The editable surface itself.
    Editor,
    /// Supplies the manager/reconciler to descendants.
    Provider,
    /// A declarative extension mount with no UI of its own.
    ExtensionDeclaration,
    /// A provider that also owns the reconciler lifecycle.
    ManagedProvider,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("root props were already claimed in render cycle {cycle}")]
    RootPropsReused { cycle: u64 },
}

/// Options for the root mount point.
#[derive(Debug, Clone)]
pub struct RootConfig {
    pub editable: bool,
    /// Accessible label forwarded to the mounted root.
    pub label: Option<String>,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            editable: true,
            label: None,
        }
    }
}

/// What the view spreads onto the root element it mounts.
#[derive(Debug, Clone, PartialEq)]
pub struct RootProps {
    pub role: FrameRole,
    pub editable: bool,
    pub label: Option<String>,
    /// Cycle the props were claimed in; stale props from an earlier cycle
    /// must not be reused.
    pub render_cycle: u64,
}

/// Per-mount bookkeeping for one slot in the UI tree.
#[derive(Debug)]
pub struct Frame {
    role: FrameRole,
    render_cycle: u64,
    root_claimed: bool,
}

impl Frame {
    pub fn new(role: FrameRole) -> Self {
        Self {
            role,
            render_cycle: 0,
            root_claimed: false,
        }
    }

    pub fn role(&self) -> FrameRole {
        self.role
    }

    pub fn render_cycle(&self) -> u64 {
        self.render_cycle
    }

    /// The owning integration layer calls this at the top of every render
    /// pass. Resets the root-props claim.
    pub fn begin_render(&mut self) {
        self.render_cycle += 1;
        self.root_claimed = false;
    }

    /// Claim the root mount point for this render cycle.
    pub fn root_props(&mut self, config: &RootConfig) -> Result<RootProps, UsageError> {
        if self.root_claimed {
            return Err(UsageError::RootPropsReused {
                cycle: self.render_cycle,
            });
        }
        self.root_claimed = true;
        Ok(RootProps {
            role: self.role,
            editable: config.editable,
            label: config.label.clone(),
            render_cycle: self.render_cycle,
        })
    }
}
