//! Edge Index
//!
//! Every typed edge in a store lives here, indexed both ways:
//!
//! - forward: source → kind → targets, in insertion order
//! - backward: target → (source, kind) pairs
//!
//! The index is guarded by a single store-level lock, so an acyclicity check
//! and the insertion it guards happen as one step. The set of acyclic kinds
//! lives under the same lock: once any repository declares a kind acyclic,
//! every insertion of that kind is checked, whichever repository makes it.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};

use super::id::Id;
use super::schema::EdgeKind;

#[derive(Debug, Default)]
pub(crate) struct EdgeIndex {
    forward: HashMap<Id, IndexMap<EdgeKind, IndexSet<Id>>>,
    backward: HashMap<Id, IndexSet<(Id, EdgeKind)>>,
    acyclic: HashSet<EdgeKind>,
    len: usize,
}

/// Endpoints touched by [`EdgeIndex::remove_node`], without duplicates.
#[derive(Debug, Default)]
pub(crate) struct Detached {
    /// Nodes that lost an outgoing edge.
    pub(crate) sources: Vec<Id>,
    /// Nodes that lost an incoming edge.
    pub(crate) targets: Vec<Id>,
}

impl EdgeIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert an edge. Returns `false` if it already existed.
    pub(crate) fn insert(&mut self, source: Id, kind: EdgeKind, target: Id) -> bool {
        let inserted = self
            .forward
            .entry(source)
            .or_default()
            .entry(kind.clone())
            .or_default()
            .insert(target);
        if inserted {
            self.backward.entry(target).or_default().insert((source, kind));
            self.len += 1;
        }
        inserted
    }

    /// Remove an edge. Returns `false` if it did not exist.
    pub(crate) fn remove(&mut self, source: Id, kind: &EdgeKind, target: Id) -> bool {
        let Some(kinds) = self.forward.get_mut(&source) else {
            return false;
        };
        let Some(targets) = kinds.get_mut(kind) else {
            return false;
        };
        if !targets.shift_remove(&target) {
            return false;
        }
        if targets.is_empty() {
            kinds.shift_remove(kind);
        }
        if kinds.is_empty() {
            self.forward.remove(&source);
        }

        if let Some(sources) = self.backward.get_mut(&target) {
            sources.shift_remove(&(source, kind.clone()));
            if sources.is_empty() {
                self.backward.remove(&target);
            }
        }
        self.len -= 1;
        true
    }

    pub(crate) fn contains(&self, source: Id, kind: &EdgeKind, target: Id) -> bool {
        self.forward
            .get(&source)
            .and_then(|kinds| kinds.get(kind))
            .is_some_and(|targets| targets.contains(&target))
    }

    pub(crate) fn targets(&self, source: Id, kind: &EdgeKind) -> Vec<Id> {
        self.forward
            .get(&source)
            .and_then(|kinds| kinds.get(kind))
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All outgoing edges of `source` as `(kind, target)` pairs.
    pub(crate) fn outgoing(&self, source: Id) -> Vec<(EdgeKind, Id)> {
        self.forward
            .get(&source)
            .map(|kinds| {
                kinds
                    .iter()
                    .flat_map(|(kind, targets)| targets.iter().map(move |target| (kind.clone(), *target)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All incoming edges of `target` as `(source, kind)` pairs.
    pub(crate) fn incoming(&self, target: Id) -> Vec<(Id, EdgeKind)> {
        self.backward
            .get(&target)
            .map(|sources| sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn sources(&self, target: Id, kind: &EdgeKind) -> Vec<Id> {
        self.backward
            .get(&target)
            .map(|sources| {
                sources
                    .iter()
                    .filter(|(_, k)| k == kind)
                    .map(|(source, _)| *source)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `to` is reachable from `from` over edges of `kind` alone.
    ///
    /// A node reaches itself.
    pub(crate) fn reaches(&self, from: Id, to: Id, kind: &EdgeKind) -> bool {
        if from == to {
            return true;
        }
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            let Some(targets) = self.forward.get(&current).and_then(|kinds| kinds.get(kind)) else {
                continue;
            };
            for &next in targets {
                if next == to {
                    return true;
                }
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    pub(crate) fn is_acyclic(&self, kind: &EdgeKind) -> bool {
        self.acyclic.contains(kind)
    }

    /// Check every insertion of `kinds` from now on.
    pub(crate) fn declare_acyclic<'a>(&mut self, kinds: impl IntoIterator<Item = &'a EdgeKind>) {
        self.acyclic.extend(kinds.into_iter().cloned());
    }

    /// Whether the edges of `kind` already contain a cycle.
    pub(crate) fn has_cycle(&self, kind: &EdgeKind) -> bool {
        self.forward.iter().any(|(source, kinds)| {
            kinds
                .get(kind)
                .is_some_and(|targets| targets.iter().any(|target| self.reaches(*target, *source, kind)))
        })
    }

    /// Remove every edge touching `id` and report the other endpoints.
    pub(crate) fn remove_node(&mut self, id: Id) -> Detached {
        let mut targets = IndexSet::new();
        for (kind, target) in self.outgoing(id) {
            self.remove(id, &kind, target);
            if target != id {
                targets.insert(target);
            }
        }

        let mut sources = IndexSet::new();
        for (source, kind) in self.incoming(id) {
            self.remove(source, &kind, id);
            sources.insert(source);
        }
        Detached {
            sources: sources.into_iter().collect(),
            targets: targets.into_iter().collect(),
        }
    }

    /// Every edge as `(source, kind, target)`.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Id, &EdgeKind, Id)> + '_ {
        self.forward.iter().flat_map(|(source, kinds)| {
            kinds.iter().flat_map(move |(kind, targets)| {
                targets.iter().map(move |target| (*source, kind, *target))
            })
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
