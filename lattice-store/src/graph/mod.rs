//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between cells and the computations that read them.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent cells (sources), memos (derived) or observers
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! When a cell changes, we traverse the graph to find all affected nodes
//! and mark them as dirty. The tracker then determines which dirty nodes
//! actually need to recompute, in dependency order.
//!
//! This graph is unrelated to the typed edges between store nodes; those live
//! in `store::edges`.

mod node;
mod scheduler;

pub use node::{DependencyNode, DirtyState, NodeKind, ReactiveId};
pub use scheduler::UpdateScheduler;
