//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between reactive values and computations.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent reactive values (signals), computations (memos, linked
//!   signals) or effects
//! - Edges represent dependencies: if A read B during its last evaluation,
//!   there is an edge from B to A
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and mark them as stale. Derived nodes then decide lazily, on their next
//! read, whether they actually need to recompute.
//!
//! # Design Decisions
//!
//! 1. Each runtime owns one arena of nodes indexed by id. There is no global
//!    graph, so independent runtimes never share state.
//!
//! 2. Edges are rebuilt from scratch after every evaluation. A dependent only
//!    ever tracks what it read last time.
//!
//! 3. Every edge remembers the version it observed. A stale node is valid
//!    again as soon as all of those versions still match.

mod node;
mod scheduler;
mod snapshot;

pub use node::{Dependency, DirtyState, Node, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
pub use snapshot::{GraphSnapshot, NodeSnapshot};
