//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each runtime owns one context: a stack of frames. When entering a reactive
//! computation (e.g., running a memo or effect), we push a tracking frame for
//! it; when the computation completes, we pop it and hand its collected
//! dependencies to the graph. An untracked frame on top of the stack hides
//! every read from the frames below it.
//!
//! The context also remembers which nodes are currently being refreshed, so a
//! node that ends up reading itself is caught instead of recursing forever.

use smallvec::SmallVec;

use crate::graph::{Dependency, NodeId};

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
pub(crate) enum Frame {
    /// A computation collecting the dependencies it reads.
    Tracking {
        /// The node being evaluated.
        node: NodeId,
        /// Dependencies collected so far, in first-read order.
        dependencies: SmallVec<[Dependency; 4]>,
    },

    /// Reads made while this frame is on top record nothing.
    Untracked,
}

/// Per-runtime evaluation context.
#[derive(Debug, Default)]
pub struct ReactiveContext {
    frames: Vec<Frame>,
    in_flight: SmallVec<[NodeId; 8]>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given node.
    ///
    /// While this context is on top, any reactive values that are read
    /// register the node as a dependent.
    pub(crate) fn enter(&mut self, node: NodeId) {
        self.frames.push(Frame::Tracking {
            node,
            dependencies: SmallVec::new(),
        });
    }

    /// Suspend tracking until the matching [`exit`](Self::exit).
    pub(crate) fn enter_untracked(&mut self) {
        self.frames.push(Frame::Untracked);
    }

    /// Pop the top frame.
    pub(crate) fn exit(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Check if reads would currently be recorded.
    pub fn is_tracking(&self) -> bool {
        matches!(self.frames.last(), Some(Frame::Tracking { .. }))
    }

    /// Get the node currently collecting dependencies, if any.
    pub fn current_subscriber(&self) -> Option<NodeId> {
        match self.frames.last() {
            Some(Frame::Tracking { node, .. }) => Some(*node),
            _ => None,
        }
    }

    /// Number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Record a dependency for the computation on top of the stack.
    ///
    /// Repeated reads of the same node keep the first observed version.
    pub(crate) fn track_dependency(&mut self, dependency: Dependency) {
        if let Some(Frame::Tracking { dependencies, .. }) = self.frames.last_mut() {
            if !dependencies.iter().any(|dep| dep.id == dependency.id) {
                dependencies.push(dependency);
            }
        }
    }

    /// Get the dependencies collected in the current context.
    pub(crate) fn get_dependencies(&self) -> SmallVec<[Dependency; 4]> {
        match self.frames.last() {
            Some(Frame::Tracking { dependencies, .. }) => dependencies.clone(),
            _ => SmallVec::new(),
        }
    }

    /// Mark a node as being refreshed. Returns `false` if it already was,
    /// which means the node depends on itself.
    pub(crate) fn begin_refresh(&mut self, node: NodeId) -> bool {
        if self.in_flight.contains(&node) {
            return false;
        }
        self.in_flight.push(node);
        true
    }

    /// Clear the refresh mark set by [`begin_refresh`](Self::begin_refresh).
    pub(crate) fn end_refresh(&mut self, node: NodeId) {
        if let Some(pos) = self.in_flight.iter().rposition(|id| *id == node) {
            self.in_flight.remove(pos);
        }
    }
}
