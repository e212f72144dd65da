//! Control Tree
//!
//! This module implements the arena that holds the shape of every control
//! tree: which control is whose parent and in what order children were
//! registered.
//!
//! # Overview
//!
//! Values flow up the tree (a leaf change recomputes every ancestor), and
//! disabled state flows down (disabling a group disables every descendant).
//! Both walks use the edges stored here.
//!
//! # Design Decisions
//!
//! 1. Edges are IDs, not references, so parent and child never own each
//!    other.
//!
//! 2. The arena is process-wide, like the reactive registries it replaces,
//!    so controls built independently can be joined into one tree later.
//!
//! 3. Children are kept in an ordered set: registration order is the order
//!    aggregation visits them in.

mod arena;
mod node;

pub use arena::{Arena, Tree};
pub use node::{ControlId, ControlKind, TreeNode};
