//! Graph Nodes
//!
//! Every cell, memo and observer owns exactly one `ReactiveId` and, once it
//! takes part in tracking, one `DependencyNode` in the tracker's graph.
//!
//! Edge sets are insertion-ordered so that two runs over the same writes
//! visit nodes in the same order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

/// Identity of a cell, memo or observer inside a tracker's graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReactiveId(u64);

impl ReactiveId {
    /// Allocate a fresh ID. IDs are process-wide, so graphs of different
    /// trackers never share one.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ReactiveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReactiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a graph node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A cell: written from outside, read by others, reads nothing.
    Source,

    /// A memo: reads other nodes and caches the result for its readers.
    Derived,

    /// An observer: reads other nodes for a side effect. Nothing reads it.
    Observer,
}

impl NodeKind {
    /// Whether nodes of this kind run code when they become dirty.
    pub fn is_computed(self) -> bool {
        !matches!(self, NodeKind::Source)
    }
}

/// How stale a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    Clean,

    /// Something upstream changed, but no direct input is known to differ.
    MaybeDirty,

    /// A direct input changed; the node must be evaluated.
    Dirty,
}

/// One vertex of the dependency graph.
#[derive(Debug)]
pub struct DependencyNode {
    id: ReactiveId,
    kind: NodeKind,
    dirty: DirtyState,
    /// What this node read during its last evaluation.
    dependencies: IndexSet<ReactiveId>,
    /// Who read this node.
    dependents: IndexSet<ReactiveId>,
}

impl DependencyNode {
    /// Computed nodes start dirty: they have never been evaluated.
    pub fn new(id: ReactiveId, kind: NodeKind) -> Self {
        let dirty = if kind.is_computed() {
            DirtyState::Dirty
        } else {
            DirtyState::Clean
        };
        Self {
            id,
            kind,
            dirty,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
        }
    }

    pub fn source(id: ReactiveId) -> Self {
        Self::new(id, NodeKind::Source)
    }

    pub fn derived(id: ReactiveId) -> Self {
        Self::new(id, NodeKind::Derived)
    }

    pub fn observer(id: ReactiveId) -> Self {
        Self::new(id, NodeKind::Observer)
    }

    pub fn id(&self) -> ReactiveId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// `Dirty` stays `Dirty`.
    pub fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    pub fn add_dependency(&mut self, id: ReactiveId) {
        self.dependencies.insert(id);
    }

    pub fn remove_dependency(&mut self, id: ReactiveId) {
        self.dependencies.shift_remove(&id);
    }

    pub fn dependencies(&self) -> &IndexSet<ReactiveId> {
        &self.dependencies
    }

    pub fn add_dependent(&mut self, id: ReactiveId) {
        self.dependents.insert(id);
    }

    pub fn remove_dependent(&mut self, id: ReactiveId) {
        self.dependents.shift_remove(&id);
    }

    pub fn dependents(&self) -> &IndexSet<ReactiveId> {
        &self.dependents
    }

    /// Empty the dependency set and hand back what it held, so the caller
    /// can unlink the other side.
    pub fn take_dependencies(&mut self) -> IndexSet<ReactiveId> {
        std::mem::take(&mut self.dependencies)
    }
}
