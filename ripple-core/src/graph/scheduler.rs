//! Update Scheduler
//!
//! The scheduler owns the node arena of one reactive graph and decides which
//! nodes go stale when a value changes.
//!
//! # Algorithm
//!
//! Propagation is "push dirty, pull values":
//!
//! 1. When a node's value changes, mark its direct dependents as "dirty"
//! 2. Propagate "maybe dirty" to their dependents, recursively
//! 3. Queue every effect reached (once) in the pending set
//! 4. Derived nodes do nothing yet. They re-check their inputs when read:
//!    - For "maybe dirty" nodes: check if any input version actually changed
//!    - For "dirty" nodes: recompute
//!
//! Pending effects are drained in id order. Ids come from a per-graph counter,
//! so this is registration order.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use smallvec::SmallVec;

use super::node::{Dependency, DirtyState, Node, NodeId, NodeKind};

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,

    /// Next id to hand out.
    next_id: u64,

    /// Effects waiting to re-run.
    pending: BTreeSet<NodeId>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node of the given kind and add it to the graph.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, kind));
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node and drops it from the
    /// pending set.
    pub fn remove_node(&mut self, node_id: NodeId) {
        self.pending.remove(&node_id);
        if let Some(node) = self.nodes.remove(&node_id) {
            // Remove this node from its dependencies' dependent lists
            for dep in node.dependencies() {
                if let Some(dep_node) = self.nodes.get_mut(&dep.id) {
                    dep_node.remove_dependent(node_id);
                }
            }

            // Dependents keep their recorded edge; the next version check
            // simply skips the missing node.
        }
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Iterate over all live nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Current version of a node, if it still exists.
    pub fn version(&self, node_id: NodeId) -> Option<u64> {
        self.nodes.get(&node_id).map(Node::version)
    }

    /// Current dirty state of a node, if it still exists.
    pub fn dirty_state(&self, node_id: NodeId) -> Option<DirtyState> {
        self.nodes.get(&node_id).map(Node::dirty_state)
    }

    /// Record a value change on a node. Returns the new version.
    pub fn bump_version(&mut self, node_id: NodeId) -> Option<u64> {
        self.nodes.get_mut(&node_id).map(Node::bump_version)
    }

    /// Mark a node clean.
    pub fn mark_clean(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_clean();
        }
    }

    /// Mark a node dirty.
    pub fn mark_dirty(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_dirty();
        }
    }

    /// Replace the dependencies of `dependent` with the ones observed during
    /// its latest evaluation.
    ///
    /// Old edges are discarded wholesale and the new ones linked; edges are
    /// never diffed. Self-edges and edges to removed nodes are ignored.
    pub fn replace_dependencies(
        &mut self,
        dependent: NodeId,
        deps: SmallVec<[Dependency; 4]>,
    ) {
        let deps: SmallVec<[Dependency; 4]> = deps
            .into_iter()
            .filter(|dep| dep.id != dependent && self.nodes.contains_key(&dep.id))
            .collect();

        let old = match self.nodes.get_mut(&dependent) {
            Some(node) => node.replace_dependencies(deps.clone()),
            None => return,
        };

        for dep in old {
            if let Some(dep_node) = self.nodes.get_mut(&dep.id) {
                dep_node.remove_dependent(dependent);
            }
        }
        for dep in deps {
            if let Some(dep_node) = self.nodes.get_mut(&dep.id) {
                dep_node.add_dependent(dependent);
            }
        }
    }

    /// Whether a dependency of `node_id` moved past the version `node_id`
    /// observed when it read it.
    pub fn has_stale_dependencies(&self, node_id: NodeId) -> bool {
        self.nodes.get(&node_id).is_some_and(|node| {
            node.dependencies()
                .iter()
                .any(|dep| self.version(dep.id).is_some_and(|version| version != dep.version))
        })
    }

    /// Remove every dependency edge of `dependent`.
    pub fn clear_dependencies(&mut self, dependent: NodeId) {
        self.replace_dependencies(dependent, SmallVec::new());
    }

    /// Mark everything downstream of a changed node as stale.
    ///
    /// Direct dependents become dirty, transitive dependents maybe-dirty.
    /// Every effect reached is queued. Returns the number of nodes touched.
    pub fn mark_changed(&mut self, source_id: NodeId) -> usize {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        // Start with the source node's direct dependents
        if let Some(source) = self.nodes.get(&source_id) {
            for dependent_id in source.dependents() {
                queue.push_back((*dependent_id, true));
            }
        }

        // BFS to propagate maybe-dirty status
        while let Some((node_id, direct)) = queue.pop_front() {
            if !visited.insert(node_id) {
                if direct {
                    if let Some(node) = self.nodes.get_mut(&node_id) {
                        node.mark_dirty();
                    }
                }
                continue;
            }

            if let Some(node) = self.nodes.get_mut(&node_id) {
                if direct {
                    node.mark_dirty();
                } else {
                    node.mark_maybe_dirty();
                }

                if node.kind() == NodeKind::Effect {
                    self.pending.insert(node_id);
                }

                // Propagate to dependents
                for dependent_id in node.dependents() {
                    queue.push_back((*dependent_id, false));
                }
            }
        }

        visited.len()
    }

    /// Queue an effect for re-running.
    pub fn schedule(&mut self, effect_id: NodeId) {
        if self.nodes.contains_key(&effect_id) {
            self.pending.insert(effect_id);
        }
    }

    /// Take the earliest-registered pending effect.
    pub fn pop_pending(&mut self) -> Option<NodeId> {
        self.pending.pop_first()
    }

    /// Drop an effect from the pending set.
    pub fn unschedule(&mut self, effect_id: NodeId) {
        self.pending.remove(&effect_id);
    }

    /// Drop every pending effect.
    pub fn clear_pending(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Pending effects in the order they will run.
    pub fn pending(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.pending.iter().copied()
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn link(scheduler: &mut UpdateScheduler, dependent: NodeId, deps: &[NodeId]) {
        let deps = deps
            .iter()
            .map(|&id| Dependency {
                id,
                version: scheduler.version(id).unwrap(),
            })
            .collect();
        scheduler.replace_dependencies(dependent, deps);
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut scheduler = UpdateScheduler::new();

        let id1 = scheduler.add_node(NodeKind::Source);
        let id2 = scheduler.add_node(NodeKind::Derived);

        assert!(id1 < id2);
        assert_eq!(scheduler.node_count(), 2);

        scheduler.remove_node(id1);
        assert_eq!(scheduler.node_count(), 1);
        assert!(scheduler.get_node(id1).is_none());
        assert!(scheduler.get_node(id2).is_some());
    }

    #[test]
    fn replace_dependencies_rebuilds_edges() {
        let mut scheduler = UpdateScheduler::new();

        let a = scheduler.add_node(NodeKind::Source);
        let b = scheduler.add_node(NodeKind::Source);
        let derived = scheduler.add_node(NodeKind::Derived);

        link(&mut scheduler, derived, &[a]);
        assert!(scheduler.get_node(a).unwrap().dependents().contains(&derived));

        // Second evaluation only read `b`
        link(&mut scheduler, derived, &[b]);
        assert!(!scheduler.get_node(a).unwrap().dependents().contains(&derived));
        assert!(scheduler.get_node(b).unwrap().dependents().contains(&derived));
        assert_eq!(scheduler.get_node(derived).unwrap().dependencies().len(), 1);

        scheduler.clear_dependencies(derived);
        assert!(scheduler.get_node(b).unwrap().dependents().is_empty());
    }

    #[test]
    fn stale_dependencies_are_detected() {
        let mut scheduler = UpdateScheduler::new();
        let source = scheduler.add_node(NodeKind::Source);
        let derived = scheduler.add_node(NodeKind::Derived);

        link(&mut scheduler, derived, &[source]);
        assert!(!scheduler.has_stale_dependencies(derived));

        scheduler.bump_version(source);
        assert!(scheduler.has_stale_dependencies(derived));
    }

    #[test]
    fn self_edges_are_ignored() {
        let mut scheduler = UpdateScheduler::new();
        let derived = scheduler.add_node(NodeKind::Derived);

        scheduler.replace_dependencies(derived, smallvec![Dependency { id: derived, version: 0 }]);
        assert!(scheduler.get_node(derived).unwrap().dependencies().is_empty());
    }

    #[test]
    fn mark_changed_propagates() {
        let mut scheduler = UpdateScheduler::new();

        // Create a chain: source -> derived1 -> derived2 -> effect
        let source = scheduler.add_node(NodeKind::Source);
        let derived1 = scheduler.add_node(NodeKind::Derived);
        let derived2 = scheduler.add_node(NodeKind::Derived);
        let effect = scheduler.add_node(NodeKind::Effect);

        link(&mut scheduler, derived1, &[source]);
        link(&mut scheduler, derived2, &[derived1]);
        link(&mut scheduler, effect, &[derived2]);

        for id in [derived1, derived2, effect] {
            scheduler.mark_clean(id);
        }

        let touched = scheduler.mark_changed(source);
        assert_eq!(touched, 3);

        assert_eq!(scheduler.dirty_state(derived1), Some(DirtyState::Dirty));
        assert_eq!(scheduler.dirty_state(derived2), Some(DirtyState::MaybeDirty));
        assert_eq!(scheduler.dirty_state(effect), Some(DirtyState::MaybeDirty));
        assert_eq!(scheduler.pending().collect::<Vec<_>>(), vec![effect]);
    }

    #[test]
    fn pending_drains_in_registration_order() {
        let mut scheduler = UpdateScheduler::new();

        let source = scheduler.add_node(NodeKind::Source);
        let e1 = scheduler.add_node(NodeKind::Effect);
        let e2 = scheduler.add_node(NodeKind::Effect);
        let e3 = scheduler.add_node(NodeKind::Effect);

        // Link in reverse so dependents order differs from id order
        link(&mut scheduler, e3, &[source]);
        link(&mut scheduler, e1, &[source]);
        link(&mut scheduler, e2, &[source]);

        scheduler.mark_changed(source);
        scheduler.mark_changed(source);

        assert_eq!(scheduler.pop_pending(), Some(e1));
        assert_eq!(scheduler.pop_pending(), Some(e2));
        assert_eq!(scheduler.pop_pending(), Some(e3));
        assert_eq!(scheduler.pop_pending(), None);
    }

    #[test]
    fn removing_a_node_unschedules_it() {
        let mut scheduler = UpdateScheduler::new();
        let effect = scheduler.add_node(NodeKind::Effect);

        scheduler.schedule(effect);
        scheduler.remove_node(effect);
        assert_eq!(scheduler.pop_pending(), None);
    }
}
