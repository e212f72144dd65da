//! Tree Nodes
//!
//! This module defines the node records stored in the control arena.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use serde::Serialize;

/// Unique identifier for a control in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ControlId(u64);

impl ControlId {
    /// Generate a new unique control ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ControlId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for ControlId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of control a node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    /// Hints, extras and messages only. Has no value.
    Item,

    /// A single value with validation state.
    Field,

    /// A fixed set of named child controls.
    Group,

    /// An ordered, resizable list of child controls.
    Array,
}

impl ControlKind {
    /// Whether this kind holds a value and validation facets.
    pub fn has_value(&self) -> bool {
        !matches!(self, ControlKind::Item)
    }

    /// Whether this kind owns child controls.
    pub fn is_composite(&self) -> bool {
        matches!(self, ControlKind::Group | ControlKind::Array)
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlKind::Item => "item",
            ControlKind::Field => "field",
            ControlKind::Group => "group",
            ControlKind::Array => "array",
        };
        f.write_str(name)
    }
}

/// A node in the control arena: identity, kind and tree edges.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Unique identifier for this node.
    id: ControlId,

    /// What kind of control this is.
    kind: ControlKind,

    /// The node that registered this one as a child.
    parent: Option<ControlId>,

    /// Nodes that named this one as parent, in registration order.
    children: IndexSet<ControlId>,
}

impl TreeNode {
    /// Create a detached node.
    pub fn new(id: ControlId, kind: ControlKind) -> Self {
        Self {
            id,
            kind,
            parent: None,
            children: IndexSet::new(),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> ControlId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    /// Get the parent, if attached.
    pub fn parent(&self) -> Option<ControlId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ControlId>) {
        self.parent = parent;
    }

    /// Register a child. Returns false if it was already registered.
    pub fn add_child(&mut self, child: ControlId) -> bool {
        self.children.insert(child)
    }

    /// Remove a child, keeping the order of the others.
    pub fn remove_child(&mut self, child: ControlId) -> bool {
        self.children.shift_remove(&child)
    }

    /// Get all children.
    pub fn children(&self) -> &IndexSet<ControlId> {
        &self.children
    }
}
