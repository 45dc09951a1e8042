//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::fmt;

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are allocated by the owning graph from a monotonic counter, so id order
/// is registration order within one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node (memo). These have dependencies and may have dependents.
    /// They cache their computed value.
    Derived,

    /// A derived node that also accepts explicit writes (linked signal).
    Linked,

    /// An effect node. These are leaves of the graph.
    /// They have dependencies but no dependents (they produce side effects, not values).
    Effect,
}

impl NodeKind {
    /// Whether nodes of this kind compute their value from dependencies.
    pub fn is_computed(&self) -> bool {
        matches!(self, NodeKind::Derived | NodeKind::Linked)
    }
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// The node might need to recompute. One of its dependencies changed,
    /// but we have not yet verified if the actual input values are different.
    MaybeDirty,

    /// The node definitely needs to recompute. Its inputs have changed.
    Dirty,
}

/// A dependency edge as seen from the dependent: which node was read and
/// which version of it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub id: NodeId,
    pub version: u64,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Current dirty state.
    dirty: DirtyState,

    /// Bumped every time the node's value changes.
    version: u64,

    /// Nodes that this node read during its last evaluation, in read order.
    dependencies: SmallVec<[Dependency; 4]>,

    /// Nodes that read this node during their last evaluation.
    dependents: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given id and kind.
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dirty: match kind {
                NodeKind::Source => DirtyState::Clean,
                // Start dirty to ensure first computation
                NodeKind::Derived | NodeKind::Linked | NodeKind::Effect => DirtyState::Dirty,
            },
            version: 0,
            dependencies: SmallVec::new(),
            dependents: IndexSet::new(),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the current dirty state.
    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    /// Get the current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Check if the node needs any processing.
    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    /// Mark the node as clean.
    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as maybe dirty (a dependency might have changed).
    pub fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    /// Mark the node as definitely dirty (needs recomputation).
    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    /// Record a value change. Returns the new version.
    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Get all dependencies with the versions observed when they were read.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub(crate) fn dependencies_mut(&mut self) -> &mut SmallVec<[Dependency; 4]> {
        &mut self.dependencies
    }

    /// Replace the dependency list, returning the previous one.
    pub(crate) fn replace_dependencies(
        &mut self,
        deps: SmallVec<[Dependency; 4]>,
    ) -> SmallVec<[Dependency; 4]> {
        std::mem::replace(&mut self.dependencies, deps)
    }

    /// Add a dependent (a node that reads from this node).
    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    /// Remove a dependent.
    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    /// Get all dependents, in the order they first read this node.
    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_node_starts_clean() {
        let node = Node::new(NodeId::from(0), NodeKind::Source);
        assert_eq!(node.kind(), NodeKind::Source);
        assert!(node.is_clean());
        assert_eq!(node.version(), 0);
    }

    #[test]
    fn computed_nodes_start_dirty() {
        for kind in [NodeKind::Derived, NodeKind::Linked, NodeKind::Effect] {
            let node = Node::new(NodeId::from(1), kind);
            assert_eq!(node.dirty_state(), DirtyState::Dirty);
        }
    }

    #[test]
    fn dependents_keep_insertion_order() {
        let mut node = Node::new(NodeId::from(0), NodeKind::Source);
        node.add_dependent(NodeId::from(5));
        node.add_dependent(NodeId::from(2));
        node.add_dependent(NodeId::from(5));

        let ids: Vec<_> = node.dependents().iter().map(|id| id.raw()).collect();
        assert_eq!(ids, vec![5, 2]);

        node.remove_dependent(NodeId::from(5));
        assert_eq!(node.dependents().len(), 1);
    }

    #[test]
    fn dirty_state_transitions() {
        let mut node = Node::new(NodeId::from(0), NodeKind::Derived);

        // Start dirty
        assert_eq!(node.dirty_state(), DirtyState::Dirty);

        // Maybe-dirty never downgrades dirty
        node.mark_maybe_dirty();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);

        node.mark_clean();
        node.mark_maybe_dirty();
        assert_eq!(node.dirty_state(), DirtyState::MaybeDirty);

        node.mark_dirty();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn versions_increase() {
        let mut node = Node::new(NodeId::from(0), NodeKind::Source);
        assert_eq!(node.bump_version(), 1);
        assert_eq!(node.bump_version(), 2);
        assert_eq!(node.version(), 2);
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId::from(42).to_string(), "#42");
    }
}
