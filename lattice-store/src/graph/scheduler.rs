//! Update Scheduler
//!
//! The scheduler determines the order in which dirty nodes should be updated.
//! It ensures that dependencies are always updated before their dependents.
//!
//! # Algorithm
//!
//! We use a topological sort to process nodes in dependency order:
//!
//! 1. When a cell changes, mark its direct dependents as "dirty"
//! 2. Propagate "maybe dirty" to their dependents, recursively
//! 3. Collect all maybe-dirty and dirty nodes
//! 4. Sort them topologically (dependencies before dependents)
//! 5. Process each node in order:
//!    - For "maybe dirty" nodes: no direct input changed, mark clean
//!    - For "dirty" nodes: recompute
//!    - If output changed, mark direct dependents as dirty
//!
//! This "push-pull" approach minimizes unnecessary recomputation.

use std::collections::{HashMap, HashSet, VecDeque};

use super::node::{DependencyNode, DirtyState, NodeKind, ReactiveId};

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<ReactiveId, DependencyNode>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph, replacing any node with the same ID.
    pub fn add_node(&mut self, node: DependencyNode) -> ReactiveId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Make sure `id` is present, inserting a node of `kind` if it is not.
    pub fn ensure_node(&mut self, id: ReactiveId, kind: NodeKind) {
        self.nodes
            .entry(id)
            .or_insert_with(|| DependencyNode::new(id, kind));
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node. Returns the removed node.
    pub fn remove_node(&mut self, id: ReactiveId) -> Option<DependencyNode> {
        let node = self.nodes.remove(&id)?;

        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(id);
            }
        }

        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(id);
            }
        }

        Some(node)
    }

    pub fn contains(&self, id: ReactiveId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get_node(&self, id: ReactiveId) -> Option<&DependencyNode> {
        self.nodes.get(&id)
    }

    pub fn get_node_mut(&mut self, id: ReactiveId) -> Option<&mut DependencyNode> {
        self.nodes.get_mut(&id)
    }

    /// Add a dependency edge: `dependent` reads from `dependency`.
    ///
    /// A missing `dependency` is inserted as a source; a missing `dependent`
    /// leaves the graph untouched.
    pub fn add_edge(&mut self, dependency: ReactiveId, dependent: ReactiveId) {
        if dependency == dependent {
            return;
        }
        let Some(dependent_node) = self.nodes.get_mut(&dependent) else {
            return;
        };
        dependent_node.add_dependency(dependency);
        self.ensure_node(dependency, NodeKind::Source);
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, dependency: ReactiveId, dependent: ReactiveId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Replace every dependency of `dependent` with `dependencies`.
    ///
    /// Called after a memo or observer re-evaluates, since the set of cells
    /// it reads may differ from one run to the next.
    pub fn replace_dependencies<I>(&mut self, dependent: ReactiveId, dependencies: I)
    where
        I: IntoIterator<Item = ReactiveId>,
    {
        let old = match self.nodes.get_mut(&dependent) {
            Some(node) => node.take_dependencies(),
            None => return,
        };
        for dep_id in old {
            if let Some(dep) = self.nodes.get_mut(&dep_id) {
                dep.remove_dependent(dependent);
            }
        }
        for dep_id in dependencies {
            self.add_edge(dep_id, dependent);
        }
    }

    /// Mark a source node as changed and propagate dirty flags.
    ///
    /// Direct dependents become dirty; everything further downstream becomes
    /// maybe dirty. Returns every affected node, unordered.
    pub fn mark_changed(&mut self, source_id: ReactiveId) -> Vec<ReactiveId> {
        let mut affected = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        let direct: Vec<ReactiveId> = match self.nodes.get(&source_id) {
            Some(source) => source.dependents().iter().copied().collect(),
            None => return affected,
        };

        for id in direct {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.mark_dirty();
            }
            queue.push_back(id);
        }

        // BFS to propagate maybe-dirty status
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }

            if let Some(node) = self.nodes.get_mut(&id) {
                node.mark_maybe_dirty();
                affected.push(id);
                queue.extend(node.dependents().iter().copied());
            }
        }

        affected
    }

    /// Mark the direct dependents of `id` as dirty.
    ///
    /// Used when a memo's output actually changed. Returns the dependents.
    pub fn mark_dependents_dirty(&mut self, id: ReactiveId) -> Vec<ReactiveId> {
        let dependents: Vec<ReactiveId> = match self.nodes.get(&id) {
            Some(node) => node.dependents().iter().copied().collect(),
            None => return Vec::new(),
        };
        for dependent_id in &dependents {
            if let Some(node) = self.nodes.get_mut(dependent_id) {
                node.mark_dirty();
            }
        }
        dependents
    }

    pub fn dirty_state(&self, id: ReactiveId) -> Option<DirtyState> {
        self.nodes.get(&id).map(DependencyNode::dirty_state)
    }

    pub fn mark_clean(&mut self, id: ReactiveId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.mark_clean();
        }
    }

    /// Perform a topological sort of the given nodes.
    ///
    /// Returns nodes in order such that dependencies come before dependents.
    /// Ties are broken by creation order. Nodes missing from the graph are
    /// dropped.
    pub fn topological_sort(&self, nodes: &[ReactiveId]) -> Vec<ReactiveId> {
        let node_set: HashSet<_> = nodes
            .iter()
            .copied()
            .filter(|id| self.nodes.contains_key(id))
            .collect();
        let mut in_degree: HashMap<ReactiveId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(node_set.len());
        let mut seeds = Vec::new();

        // Calculate in-degrees (only counting edges within the node set)
        for &id in &node_set {
            if let Some(node) = self.nodes.get(&id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|dependency| node_set.contains(*dependency))
                    .count();
                in_degree.insert(id, degree);
                if degree == 0 {
                    seeds.push(id);
                }
            }
        }
        seeds.sort_unstable();
        let mut queue: VecDeque<ReactiveId> = seeds.into();

        // Kahn's algorithm
        while let Some(id) = queue.pop_front() {
            result.push(id);

            if let Some(node) = self.nodes.get(&id) {
                let mut ready = Vec::new();
                for &dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(&dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.push(dependent_id);
                        }
                    }
                }
                ready.sort_unstable();
                queue.extend(ready);
            }
        }

        // A memo that reads itself through another memo closes a loop that
        // Kahn cannot order; run those last rather than dropping them.
        if result.len() < node_set.len() {
            let placed: HashSet<_> = result.iter().copied().collect();
            let mut rest: Vec<_> = node_set.difference(&placed).copied().collect();
            rest.sort_unstable();
            result.extend(rest);
        }

        result
    }

    /// Number of nodes that currently read from `id`.
    pub fn dependent_count(&self, id: ReactiveId) -> usize {
        self.nodes.get(&id).map_or(0, |node| node.dependents().len())
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_derived(scheduler: &mut UpdateScheduler) -> ReactiveId {
        let id = scheduler.add_node(DependencyNode::derived(ReactiveId::new()));
        scheduler.mark_clean(id);
        id
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut scheduler = UpdateScheduler::new();

        let id1 = scheduler.add_node(DependencyNode::source(ReactiveId::new()));
        let id2 = scheduler.add_node(DependencyNode::derived(ReactiveId::new()));
        assert_eq!(scheduler.node_count(), 2);

        scheduler.remove_node(id1);
        assert_eq!(scheduler.node_count(), 1);
        assert!(scheduler.get_node(id1).is_none());
        assert!(scheduler.get_node(id2).is_some());
    }

    #[test]
    fn add_edge_inserts_missing_source() {
        let mut scheduler = UpdateScheduler::new();
        let cell = ReactiveId::new();
        let derived = clean_derived(&mut scheduler);

        scheduler.add_edge(cell, derived);

        assert_eq!(scheduler.get_node(cell).unwrap().kind(), NodeKind::Source);
        assert!(scheduler.get_node(cell).unwrap().dependents().contains(&derived));
        assert!(scheduler.get_node(derived).unwrap().dependencies().contains(&cell));

        scheduler.remove_edge(cell, derived);
        assert_eq!(scheduler.dependent_count(cell), 0);
    }

    #[test]
    fn remove_node_detaches_edges() {
        let mut scheduler = UpdateScheduler::new();
        let cell = ReactiveId::new();
        let derived = clean_derived(&mut scheduler);
        scheduler.add_edge(cell, derived);

        scheduler.remove_node(cell);
        assert!(scheduler.get_node(derived).unwrap().dependencies().is_empty());
    }

    #[test]
    fn replace_dependencies_drops_stale_edges() {
        let mut scheduler = UpdateScheduler::new();
        let a = ReactiveId::new();
        let b = ReactiveId::new();
        let derived = clean_derived(&mut scheduler);

        scheduler.replace_dependencies(derived, [a]);
        assert_eq!(scheduler.dependent_count(a), 1);

        scheduler.replace_dependencies(derived, [b]);
        assert_eq!(scheduler.dependent_count(a), 0);
        assert_eq!(scheduler.dependent_count(b), 1);
    }

    #[test]
    fn mark_changed_propagates() {
        let mut scheduler = UpdateScheduler::new();

        // Create a chain: source -> derived1 -> derived2
        let source = ReactiveId::new();
        let derived1 = clean_derived(&mut scheduler);
        let derived2 = clean_derived(&mut scheduler);
        scheduler.add_edge(source, derived1);
        scheduler.add_edge(derived1, derived2);

        let affected = scheduler.mark_changed(source);
        assert_eq!(affected.len(), 2);

        // Direct dependents are dirty, the rest only maybe dirty
        assert_eq!(scheduler.dirty_state(derived1), Some(DirtyState::Dirty));
        assert_eq!(scheduler.dirty_state(derived2), Some(DirtyState::MaybeDirty));

        let order = scheduler.topological_sort(&affected);
        let pos1 = order.iter().position(|&id| id == derived1);
        let pos2 = order.iter().position(|&id| id == derived2);
        assert!(pos1 < pos2);
    }

    #[test]
    fn diamond_orders_producers_first() {
        let mut scheduler = UpdateScheduler::new();

        // source -> left, source -> right, {left, right} -> sink
        let source = ReactiveId::new();
        let left = clean_derived(&mut scheduler);
        let right = clean_derived(&mut scheduler);
        let sink = scheduler.add_node(DependencyNode::observer(ReactiveId::new()));
        scheduler.mark_clean(sink);
        scheduler.add_edge(source, left);
        scheduler.add_edge(source, right);
        scheduler.add_edge(left, sink);
        scheduler.add_edge(right, sink);

        let affected = scheduler.mark_changed(source);
        let order = scheduler.topological_sort(&affected);

        assert_eq!(order.len(), 3);
        assert_eq!(order.last(), Some(&sink));
    }

    #[test]
    fn mark_dependents_dirty_only_touches_direct_dependents() {
        let mut scheduler = UpdateScheduler::new();
        let derived1 = clean_derived(&mut scheduler);
        let derived2 = clean_derived(&mut scheduler);
        let derived3 = clean_derived(&mut scheduler);
        scheduler.add_edge(derived1, derived2);
        scheduler.add_edge(derived2, derived3);

        let dirtied = scheduler.mark_dependents_dirty(derived1);
        assert_eq!(dirtied, vec![derived2]);
        assert_eq!(scheduler.dirty_state(derived3), Some(DirtyState::Clean));
    }
}
