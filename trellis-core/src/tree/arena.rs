//! Control Arena
//!
//! The arena stores every live control's tree edges by ID. Parents and
//! children refer to each other through [`ControlId`]s only, so the tree has
//! no reference cycles and both directions are O(1) to traverse.
//!
//! # Ownership
//!
//! The arena does not own controls. Groups and arrays own their children
//! through handles; the arena keeps weak handles for ID lookups, and a
//! control removes itself when its last handle is dropped.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{OnceLock, Weak};

use parking_lot::RwLock;

use super::node::{ControlId, ControlKind, TreeNode};
use crate::control::{Control, ControlNode};

/// Tree edges for a set of controls.
pub struct Arena {
    /// All nodes in the tree, indexed by ID.
    nodes: HashMap<ControlId, TreeNode>,
}

impl Arena {
    /// Create a new empty arena.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node to the arena.
    pub fn add_node(&mut self, node: TreeNode) -> ControlId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the arena.
    ///
    /// Also removes all edges involving this node: it leaves its parent's
    /// children, and its children become roots.
    pub fn remove_node(&mut self, id: ControlId) {
        if let Some(node) = self.nodes.remove(&id) {
            if let Some(parent) = node.parent().and_then(|p| self.nodes.get_mut(&p)) {
                parent.remove_child(id);
            }

            for child_id in node.children() {
                if let Some(child) = self.nodes.get_mut(child_id) {
                    child.set_parent(None);
                }
            }
        }
    }

    /// Get a reference to a node.
    pub fn get_node(&self, id: ControlId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    /// Get the kind of a node.
    pub fn kind(&self, id: ControlId) -> Option<ControlKind> {
        self.nodes.get(&id).map(TreeNode::kind)
    }

    /// Rewire the edge between `child` and its parent.
    ///
    /// Passing `None` detaches the child. Self-parenting and parenting under
    /// one's own descendant are refused and leave the tree unchanged.
    /// Returns whether the tree changed.
    pub fn set_parent(&mut self, child: ControlId, parent: Option<ControlId>) -> bool {
        if parent == Some(child) {
            return false;
        }
        if let Some(parent_id) = parent {
            if !self.nodes.contains_key(&parent_id) || self.is_ancestor(child, parent_id) {
                return false;
            }
        }

        let previous = match self.nodes.get(&child) {
            Some(node) => node.parent(),
            None => return false,
        };
        if previous == parent {
            // Still make sure the parent lists the child
            if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
                return parent.add_child(child);
            }
            return false;
        }

        if let Some(old) = previous.and_then(|p| self.nodes.get_mut(&p)) {
            old.remove_child(child);
        }
        if let Some(new) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            new.add_child(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.set_parent(parent);
        }
        true
    }

    /// Get the parent of a node.
    pub fn parent(&self, id: ControlId) -> Option<ControlId> {
        self.nodes.get(&id).and_then(TreeNode::parent)
    }

    /// Get the direct children of a node, in registration order.
    pub fn children(&self, id: ControlId) -> Vec<ControlId> {
        self.nodes
            .get(&id)
            .map(|node| node.children().iter().copied().collect())
            .unwrap_or_default()
    }

    /// All descendants of a node, parents before their children.
    pub fn descendants(&self, id: ControlId) -> Vec<ControlId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<ControlId> = self.children(id).into();

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            result.push(node_id);
            queue.extend(self.children(node_id));
        }

        result
    }

    /// The chain of parents from the direct parent up to the root.
    pub fn ancestors(&self, id: ControlId) -> Vec<ControlId> {
        let mut result = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if result.contains(&parent) {
                break;
            }
            result.push(parent);
            current = self.parent(parent);
        }
        result
    }

    /// Whether `ancestor` sits above `id` in the tree.
    pub fn is_ancestor(&self, ancestor: ControlId, id: ControlId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Get the total number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide control tree.
///
/// Every control registers here on construction and unregisters when its
/// last handle drops.
pub struct Tree;

static ARENA: OnceLock<RwLock<Arena>> = OnceLock::new();
static HANDLES: OnceLock<RwLock<HashMap<ControlId, Weak<ControlNode>>>> = OnceLock::new();

fn get_arena() -> &'static RwLock<Arena> {
    ARENA.get_or_init(|| RwLock::new(Arena::new()))
}

fn get_handles() -> &'static RwLock<HashMap<ControlId, Weak<ControlNode>>> {
    HANDLES.get_or_init(|| RwLock::new(HashMap::new()))
}

impl Tree {
    /// Register a freshly built control.
    pub(crate) fn register(id: ControlId, kind: ControlKind, node: Weak<ControlNode>) {
        get_arena().write().add_node(TreeNode::new(id, kind));
        get_handles().write().insert(id, node);
    }

    /// Forget a control and all of its edges.
    pub(crate) fn unregister(id: ControlId) {
        get_arena().write().remove_node(id);
        get_handles().write().remove(&id);
    }

    /// Look up a live control by ID.
    pub fn lookup(id: ControlId) -> Option<Control> {
        // Release the lock before upgrading: dropping the upgraded handle
        // may unregister the node.
        let weak = get_handles().read().get(&id).cloned()?;
        weak.upgrade().map(Control::from_node)
    }

    /// Rewire a tree edge. See [`Arena::set_parent`].
    pub fn set_parent(child: ControlId, parent: Option<ControlId>) -> bool {
        get_arena().write().set_parent(child, parent)
    }

    /// Get the parent of a control.
    pub fn parent(id: ControlId) -> Option<ControlId> {
        get_arena().read().parent(id)
    }

    /// Get the children of a control.
    pub fn children(id: ControlId) -> Vec<ControlId> {
        get_arena().read().children(id)
    }

    /// Get the descendants of a control, parents first.
    pub fn descendants(id: ControlId) -> Vec<ControlId> {
        get_arena().read().descendants(id)
    }

    /// Get the ancestors of a control, nearest first.
    pub fn ancestors(id: ControlId) -> Vec<ControlId> {
        get_arena().read().ancestors(id)
    }

    /// Number of registered controls.
    pub fn len() -> usize {
        get_arena().read().node_count()
    }
}
