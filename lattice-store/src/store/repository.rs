//! Repositories
//!
//! A [`Repository`] owns the nodes of one model type. Every structural
//! change to those nodes goes through it: creation, deletion, and edges.
//!
//! # Schema
//!
//! Each repository instance adopts one [`SchemaDescriptor`], either
//! explicitly through [`Repository::init_schema`] or lazily on the first
//! `create`. The initialized state belongs to the instance; a repository
//! opened again after disposal starts uninitialized.
//!
//! # Disposal
//!
//! [`Repository::dispose`] deletes every node and turns later operations
//! into `RepositoryDisposed` errors. Dropping the last handle disposes too.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::config::CascadePolicy;
use crate::error::{Result, StoreError};

use super::edges::EdgeIndex;
use super::id::Id;
use super::model::{InitialValues, ModelSpec};
use super::node::Node;
use super::schema::{EdgeKind, Schema, SchemaDescriptor};
use super::snapshot::{EdgeSnapshot, NodeSnapshot, RepositorySnapshot};
use super::value::Value;
use super::{Registration, StoreInner};

pub(crate) struct RepositoryState {
    pub(crate) nodes: IndexMap<Id, Node>,
    disposed: bool,
}

pub(crate) struct RepositoryInner {
    name: Arc<str>,
    model: Arc<ModelSpec>,
    schema: Arc<RwLock<Schema>>,
    store: Arc<StoreInner>,
    pub(crate) state: Mutex<RepositoryState>,
}

impl RepositoryInner {
    pub(crate) fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Delete every node and refuse further operations.
    ///
    /// Edges into these nodes are removed regardless of stickiness.
    fn teardown(&self) -> usize {
        let _batch = self.store.tracker.begin_batch();
        let removal = {
            let mut state = self.state.lock();
            if state.disposed {
                return 0;
            }
            state.disposed = true;
            let ids: Vec<Id> = state.nodes.keys().copied().collect();
            let mut edges = self.store.edges.lock();
            remove_nodes(&self.store, &mut state, &mut edges, &ids)
        };

        let count = removal.removed.len();
        removal.finish();
        debug!(model = %self.name, nodes = count, "repository disposed");
        count
    }
}

impl Drop for RepositoryInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Nodes taken out of the store, and the survivors whose edges changed.
///
/// Built under the locks, finished after they are released.
#[derive(Default)]
pub(crate) struct Removal {
    pub(crate) removed: Vec<Node>,
    /// Survivors that lost an outgoing edge.
    pub(crate) sources: Vec<Node>,
    /// Survivors that lost an incoming edge.
    pub(crate) targets: Vec<Node>,
}

impl Removal {
    pub(crate) fn absorb(&mut self, other: Removal) {
        self.removed.extend(other.removed);
        self.sources.extend(other.sources);
        self.targets.extend(other.targets);
    }

    /// Detach removed nodes and notify survivors.
    pub(crate) fn finish(self) {
        for node in &self.removed {
            node.detach();
        }
        for node in &self.sources {
            node.bump_links();
        }
        for node in &self.targets {
            node.bump_backlinks();
        }
    }
}

/// Unregister `ids` from `state`, the id registry, and the edge index.
pub(crate) fn remove_nodes(
    store: &StoreInner,
    state: &mut RepositoryState,
    edges: &mut EdgeIndex,
    ids: &[Id],
) -> Removal {
    let mut removed = Vec::with_capacity(ids.len());
    let mut sources = Vec::new();
    let mut targets = Vec::new();

    for id in ids {
        let Some(node) = state.nodes.shift_remove(id) else {
            continue;
        };
        let detached = edges.remove_node(*id);
        sources.extend(detached.sources);
        targets.extend(detached.targets);
        store.ids.remove(id);
        removed.push(node);
    }

    Removal {
        removed,
        sources: survivors(store, sources),
        targets: survivors(store, targets),
    }
}

/// Live nodes among `ids`, once each.
fn survivors(store: &StoreInner, ids: Vec<Id>) -> Vec<Node> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .filter_map(|id| store.node(id))
        .collect()
}

/// The per-model façade over a store.
///
/// Clones share the same repository.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepositoryInner>,
}

impl Repository {
    pub(crate) fn open(store: Arc<StoreInner>, model: ModelSpec) -> Self {
        Self {
            inner: Arc::new(RepositoryInner {
                name: Arc::from(model.name()),
                model: Arc::new(model),
                schema: Arc::new(RwLock::new(Schema::default())),
                store,
                state: Mutex::new(RepositoryState {
                    nodes: IndexMap::new(),
                    disposed: false,
                }),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<RepositoryInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn model(&self) -> &ModelSpec {
        &self.inner.model
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.is_disposed() {
            Err(StoreError::RepositoryDisposed(self.name().to_owned()))
        } else {
            Ok(())
        }
    }

    fn check_owned(&self, node: &Node) -> Result<()> {
        if node.model_name() == self.name() {
            Ok(())
        } else {
            Err(StoreError::ForeignNode {
                id: node.id(),
                expected: self.name().to_owned(),
                found: node.model_name().to_owned(),
            })
        }
    }

    // ------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------

    /// Adopt the schema the model declares.
    pub fn init_schema(&self) -> Result<SchemaDescriptor> {
        self.init_schema_with(self.inner.model.schema().clone())
    }

    /// Adopt `descriptor` as this repository's schema.
    ///
    /// Repeating an identical declaration is a no-op. A different one fails
    /// with `InvalidSchema` and leaves the adopted schema in place, as does
    /// declaring a kind acyclic whose edges already form a cycle.
    ///
    /// Acyclic kinds are enforced store-wide from then on: a link of that
    /// kind made through any repository is checked.
    pub fn init_schema_with(&self, descriptor: SchemaDescriptor) -> Result<SchemaDescriptor> {
        self.adopt_schema(&descriptor)?;
        Ok(descriptor)
    }

    /// Returns whether `descriptor` was newly adopted.
    fn adopt_schema(&self, descriptor: &SchemaDescriptor) -> Result<bool> {
        self.check_open()?;
        let mut edges = self.inner.store.edges.lock();
        let mut schema = self.inner.schema.write();
        if !schema.check(&self.inner.model, descriptor)? {
            return Ok(false);
        }
        let cyclic = descriptor
            .acyclic_edges
            .iter()
            .find(|kind| !edges.is_acyclic(kind) && edges.has_cycle(kind));
        if let Some(kind) = cyclic {
            return Err(StoreError::InvalidSchema {
                model: self.name().to_owned(),
                reason: format!("{kind} edges already form a cycle"),
            });
        }

        edges.declare_acyclic(&descriptor.acyclic_edges);
        schema.adopt(&self.inner.model, descriptor.clone())?;
        debug!(model = %self.name(), ?descriptor, "schema initialized");
        Ok(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.schema.read().is_initialized()
    }

    /// The adopted schema, if any.
    pub fn schema(&self) -> Option<SchemaDescriptor> {
        self.inner.schema.read().descriptor().cloned()
    }

    fn ensure_schema(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            self.init_schema().map(drop)
        }
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Create a node from `initial`, with defaults for omitted fields.
    ///
    /// Fails with `InvalidInitialValue` if a required field ends up without
    /// a value, and with `IdCollision` if every identifier drawn is taken.
    pub fn create(&self, initial: InitialValues) -> Result<Node> {
        self.ensure_schema()?;
        let values = self.inner.model.resolve(&initial)?;

        let retries = self.inner.store.config.id_retries;
        let mut attempt = 0;
        loop {
            let id = self.inner.store.id_source.next_id();
            match self.insert(id, values.clone()) {
                Err(StoreError::IdCollision(id)) if attempt < retries => {
                    warn!(model = %self.name(), %id, attempt, "identifier collision, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Create a node under a caller-chosen identifier.
    pub fn create_with_id(&self, id: Id, initial: InitialValues) -> Result<Node> {
        self.ensure_schema()?;
        let values = self.inner.model.resolve(&initial)?;
        self.insert(id, values)
    }

    fn insert(&self, id: Id, values: IndexMap<String, Option<Value>>) -> Result<Node> {
        let store = &self.inner.store;
        let mut state = self.inner.state.lock();
        if state.disposed {
            return Err(StoreError::RepositoryDisposed(self.name().to_owned()));
        }

        let node = Node::build(
            id,
            Arc::clone(&self.inner.model),
            Arc::clone(&self.inner.schema),
            Arc::clone(store),
            values,
        )?;
        match store.ids.entry(id) {
            Entry::Occupied(_) => return Err(StoreError::IdCollision(id)),
            Entry::Vacant(slot) => {
                slot.insert(Registration {
                    model: Arc::clone(&self.inner.name),
                    node: node.downgrade(),
                });
            }
        }
        node.retain_sticky_cells();
        state.nodes.insert(id, node.clone());

        trace!(model = %self.name(), %id, "node created");
        Ok(node)
    }

    /// Fetch a node. Unknown and deleted identifiers yield `None`.
    pub fn get(&self, id: Id) -> Option<Node> {
        self.inner.state.lock().nodes.get(&id).cloned()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.inner.state.lock().nodes.contains_key(&id)
    }

    pub fn identifier_of(&self, node: &Node) -> Id {
        node.id()
    }

    /// Delete a node.
    ///
    /// Edges from other nodes into this one are handled by the store's
    /// [`CascadePolicy`]. Returns `false` if the node was already gone.
    pub fn delete(&self, node: &Node) -> Result<bool> {
        self.check_owned(node)?;
        let id = node.id();
        let store = &self.inner.store;

        let _batch = store.tracker.begin_batch();
        let removal = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(StoreError::RepositoryDisposed(self.name().to_owned()));
            }
            if !state.nodes.contains_key(&id) {
                return Ok(false);
            }

            let mut edges = store.edges.lock();
            let incoming: Vec<(Id, EdgeKind)> = edges
                .incoming(id)
                .into_iter()
                .filter(|(origin, _)| *origin != id)
                .collect();

            match store.config.cascade {
                CascadePolicy::Restrict if !incoming.is_empty() => {
                    return Err(StoreError::ReferencedNode {
                        id,
                        count: incoming.len(),
                    });
                }
                CascadePolicy::Restrict => {}
                CascadePolicy::RemoveUnlessSticky => {
                    let sticky = incoming.into_iter().find(|(origin, kind)| {
                        store
                            .node(*origin)
                            .is_some_and(|origin| origin.is_sticky_edge(kind))
                    });
                    if let Some((origin, kind)) = sticky {
                        debug!(%id, %origin, %kind, "delete refused by sticky edge");
                        return Err(StoreError::StickyReferenceViolation {
                            target: id,
                            origin,
                            kind,
                        });
                    }
                }
            }

            remove_nodes(store, &mut state, &mut edges, &[id])
        };

        removal.finish();
        trace!(model = %self.name(), %id, "node deleted");
        Ok(true)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.inner.state.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live nodes in creation order.
    pub fn nodes(&self) -> Vec<Node> {
        self.inner.state.lock().nodes.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<Id> {
        self.inner.state.lock().nodes.keys().copied().collect()
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Add an edge `node -[kind]-> target`.
    ///
    /// `target` may live in any repository of the store. If any repository
    /// of the store declares `kind` acyclic and the edge would close a cycle
    /// of `kind` edges, nothing changes and `CycleViolation` is returned.
    /// Returns whether the edge is new.
    pub fn link(&self, node: &Node, kind: impl Into<EdgeKind>, target: Id) -> Result<bool> {
        self.check_owned(node)?;
        let kind = kind.into();
        let origin = node.id();
        let store = &self.inner.store;

        let _batch = store.tracker.begin_batch();
        let (source, inserted) = {
            let state = self.inner.state.lock();
            if state.disposed {
                return Err(StoreError::RepositoryDisposed(self.name().to_owned()));
            }
            let source = state
                .nodes
                .get(&origin)
                .cloned()
                .ok_or(StoreError::UnknownNode(origin))?;

            let mut edges = store.edges.lock();
            if !store.ids.contains_key(&target) {
                return Err(StoreError::UnknownNode(target));
            }
            if edges.is_acyclic(&kind) && edges.reaches(target, origin, &kind) {
                debug!(%origin, %kind, %target, "edge rejected: would close a cycle");
                return Err(StoreError::CycleViolation {
                    kind,
                    origin,
                    target,
                });
            }
            (source, edges.insert(origin, kind.clone(), target))
        };

        if inserted {
            source.bump_links();
            if let Some(incoming) = store.node(target) {
                incoming.bump_backlinks();
            }
            trace!(%origin, %kind, %target, "edge added");
        }
        Ok(inserted)
    }

    /// Remove the edge `node -[kind]-> target`. Returns whether it existed.
    pub fn unlink(&self, node: &Node, kind: impl Into<EdgeKind>, target: Id) -> Result<bool> {
        self.check_owned(node)?;
        let kind = kind.into();
        let origin = node.id();
        let store = &self.inner.store;

        let _batch = store.tracker.begin_batch();
        let (source, removed) = {
            let state = self.inner.state.lock();
            if state.disposed {
                return Err(StoreError::RepositoryDisposed(self.name().to_owned()));
            }
            let source = state
                .nodes
                .get(&origin)
                .cloned()
                .ok_or(StoreError::UnknownNode(origin))?;
            let removed = store.edges.lock().remove(origin, &kind, target);
            (source, removed)
        };

        if removed {
            source.bump_links();
            if let Some(incoming) = store.node(target) {
                incoming.bump_backlinks();
            }
            trace!(%origin, %kind, %target, "edge removed");
        }
        Ok(removed)
    }

    /// Nodes with a `kind` edge into `target`, from any repository.
    ///
    /// Not tracked; [`Node::sources`] subscribes to changes.
    pub fn sources_of(&self, target: Id, kind: impl Into<EdgeKind>) -> Vec<Id> {
        self.inner.store.edges.lock().sources(target, &kind.into())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Delete every node and close the repository.
    ///
    /// Returns the number of nodes deleted. Disposing twice is a no-op.
    pub fn dispose(&self) -> usize {
        self.inner.teardown()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Capture every node's values and outgoing edges.
    pub fn snapshot(&self) -> Result<RepositorySnapshot> {
        self.check_open()?;
        let schema = self
            .schema()
            .unwrap_or_else(|| self.inner.model.schema().clone());

        let state = self.inner.state.lock();
        let edges = self.inner.store.edges.lock();
        let nodes = state
            .nodes
            .values()
            .map(|node| NodeSnapshot {
                id: node.id(),
                values: node.values(),
                edges: edges
                    .outgoing(node.id())
                    .into_iter()
                    .map(|(kind, target)| EdgeSnapshot { kind, target })
                    .collect(),
            })
            .collect();

        Ok(RepositorySnapshot {
            model: self.name().to_owned(),
            schema,
            nodes,
        })
    }

    /// Recreate the nodes and edges of `snapshot` under their identifiers.
    ///
    /// Everything is validated before the schema is adopted and the first
    /// node is created. If an edge is refused midway, the nodes created so
    /// far are removed again and a schema adopted by this call is dropped.
    pub fn restore(&self, snapshot: &RepositorySnapshot) -> Result<Vec<Node>> {
        if snapshot.model != self.name() {
            return Err(StoreError::InvalidSchema {
                model: self.name().to_owned(),
                reason: format!("snapshot holds {} nodes", snapshot.model),
            });
        }
        self.check_open()?;
        self.inner.schema.read().check(&self.inner.model, &snapshot.schema)?;

        let store = &self.inner.store;
        let mut restored = HashSet::with_capacity(snapshot.nodes.len());
        let mut resolved = Vec::with_capacity(snapshot.nodes.len());
        for node in &snapshot.nodes {
            if !restored.insert(node.id) || store.ids.contains_key(&node.id) {
                return Err(StoreError::IdCollision(node.id));
            }
            resolved.push((node.id, self.inner.model.resolve(&node.initial_values())?));
        }
        if let Some(edge) = snapshot
            .nodes
            .iter()
            .flat_map(|node| &node.edges)
            .find(|edge| !restored.contains(&edge.target) && !store.ids.contains_key(&edge.target))
        {
            return Err(StoreError::UnknownNode(edge.target));
        }
        let adopted = self.adopt_schema(&snapshot.schema)?;

        let _batch = store.tracker.begin_batch();
        let mut created = Vec::with_capacity(resolved.len());
        let outcome = (|| -> Result<()> {
            for (id, values) in resolved {
                created.push(self.insert(id, values)?);
            }
            for (node, recorded) in created.iter().zip(&snapshot.nodes) {
                for edge in &recorded.edges {
                    self.link(node, edge.kind.clone(), edge.target)?;
                }
            }
            Ok(())
        })();

        match outcome {
            Ok(()) => {
                debug!(model = %self.name(), nodes = created.len(), "snapshot restored");
                Ok(created)
            }
            Err(err) => {
                let ids: Vec<Id> = created.iter().map(Node::id).collect();
                let removal = {
                    let mut state = self.inner.state.lock();
                    let mut edges = store.edges.lock();
                    remove_nodes(store, &mut state, &mut edges, &ids)
                };
                removal.finish();
                if adopted {
                    self.inner.schema.write().reset();
                }
                warn!(model = %self.name(), %err, "snapshot restore rolled back");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("model", &self.name())
            .field("nodes", &self.len())
            .field("initialized", &self.is_initialized())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
