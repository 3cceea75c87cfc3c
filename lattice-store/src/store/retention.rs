//! Retention Pruning
//!
//! Mark and sweep over the whole store.
//!
//! # Roots
//!
//! A node is kept when any of these holds:
//!
//! - its type is a sticky node in its repository's schema
//! - a handle to it lives outside its repository
//! - a computation reads one of its cells or its edges
//! - a sticky edge points at it
//!
//! Everything reachable from a root over outgoing edges of any kind is kept
//! too. The rest is deleted.
//!
//! Survivors then give back the tracker registrations of cells nobody reads,
//! unless the schema declares those cells sticky. A released cell registers
//! again on its next tracked read.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tracing::debug;

use super::id::Id;
use super::node::Node;
use super::repository::{remove_nodes, Removal};
use super::StoreInner;

/// What a [`Store::prune`](super::Store::prune) pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Nodes that were roots of the pass.
    pub roots: usize,
    /// Nodes kept, roots included.
    pub nodes_retained: usize,
    pub nodes_removed: usize,
    /// Edges removed with their nodes or as dangling references.
    pub edges_removed: usize,
    /// Cells whose tracker registration was released.
    pub cells_released: usize,
}

pub(crate) fn prune(store: &StoreInner) -> PruneReport {
    let repositories = store.repositories();
    let _batch = store.tracker.begin_batch();
    let mut report = PruneReport::default();

    let (removal, survivors) = {
        let mut states: Vec<_> = repositories.iter().map(|repository| repository.state.lock()).collect();
        let mut edges = store.edges.lock();
        let edges_before = edges.len();

        // Mark
        let mut queue: VecDeque<Id> = VecDeque::new();
        for state in &states {
            for node in state.nodes.values() {
                if node.is_sticky() || node.strong_count() > 1 || node.is_observed() {
                    queue.push_back(node.id());
                }
            }
        }
        for (origin, kind, target) in edges.iter() {
            if store.node(origin).is_some_and(|origin| origin.is_sticky_edge(kind)) {
                queue.push_back(target);
            }
        }

        let mut marked: HashSet<Id> = queue.iter().copied().collect();
        report.roots = marked.len();
        while let Some(id) = queue.pop_front() {
            for (_, target) in edges.outgoing(id) {
                if marked.insert(target) {
                    queue.push_back(target);
                }
            }
        }

        // Sweep nodes
        let mut removal = Removal::default();
        let mut survivors: Vec<Node> = Vec::new();
        for state in states.iter_mut() {
            let (keep, unmarked): (Vec<Id>, Vec<Id>) =
                state.nodes.keys().copied().partition(|id| marked.contains(id));
            removal.absorb(remove_nodes(store, state, &mut edges, &unmarked));
            survivors.extend(keep.iter().filter_map(|id| state.nodes.get(id).cloned()));
        }

        // Sweep dangling edges
        let dangling: Vec<_> = edges
            .iter()
            .filter(|(origin, _, target)| !store.ids.contains_key(origin) || !store.ids.contains_key(target))
            .filter(|(origin, kind, _)| !store.node(*origin).is_some_and(|origin| origin.is_sticky_edge(kind)))
            .map(|(origin, kind, target)| (origin, kind.clone(), target))
            .collect();
        for (origin, kind, target) in dangling {
            edges.remove(origin, &kind, target);
            removal.sources.extend(store.node(origin));
            removal.targets.extend(store.node(target));
        }

        report.edges_removed = edges_before - edges.len();
        (removal, survivors)
    };

    report.nodes_removed = removal.removed.len();
    report.nodes_retained = survivors.len();
    report.cells_released = survivors.iter().map(Node::release_cells).sum();
    removal.finish();

    debug!(
        roots = report.roots,
        retained = report.nodes_retained,
        removed = report.nodes_removed,
        edges = report.edges_removed,
        cells = report.cells_released,
        "prune finished"
    );
    report
}
