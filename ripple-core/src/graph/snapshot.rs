//! Graph Snapshots
//!
//! A serializable, point-in-time view of a dependency graph, used for
//! debugging and for asserting graph shape in tests.

use serde::Serialize;

use super::node::{DirtyState, Node, NodeId, NodeKind};
use super::scheduler::UpdateScheduler;

/// One node as captured in a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub state: DirtyState,
    pub version: u64,
    pub dependencies: Vec<NodeId>,
    pub dependents: Vec<NodeId>,
}

impl From<&Node> for NodeSnapshot {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id(),
            kind: node.kind(),
            state: node.dirty_state(),
            version: node.version(),
            dependencies: node.dependencies().iter().map(|dep| dep.id).collect(),
            dependents: node.dependents().iter().copied().collect(),
        }
    }
}

/// The whole graph, nodes sorted by id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphSnapshot {
    pub label: String,
    pub nodes: Vec<NodeSnapshot>,
    pub pending: Vec<NodeId>,
}

impl GraphSnapshot {
    pub(crate) fn capture(label: &str, scheduler: &UpdateScheduler) -> Self {
        let mut nodes: Vec<NodeSnapshot> = scheduler.nodes().map(NodeSnapshot::from).collect();
        nodes.sort_by_key(|node| node.id);

        Self {
            label: label.to_owned(),
            nodes,
            pending: scheduler.pending().collect(),
        }
    }

    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes
            .binary_search_by_key(&id, |node| node.id)
            .ok()
            .map(|index| &self.nodes[index])
    }

    /// Whether `dependent` read `dependency` during its last evaluation.
    pub fn depends_on(&self, dependent: NodeId, dependency: NodeId) -> bool {
        self.node(dependent)
            .is_some_and(|node| node.dependencies.contains(&dependency))
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
