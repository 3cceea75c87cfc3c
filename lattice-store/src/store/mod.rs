//! Object-Graph Store
//!
//! This module layers identity-addressed nodes over the reactive engine.
//!
//! # Structure
//!
//! ```text
//! Store
//!  ├── Tracker            one per store; every cell of every node uses it
//!  ├── id registry        live id → node, shared by all repositories
//!  ├── EdgeIndex          every typed edge and the acyclic kinds, behind one lock
//!  └── Repository (per model)
//!       ├── ModelSpec     fields and declared schema
//!       ├── Schema        adopted once per repository instance
//!       └── id → Node map
//! ```
//!
//! Structural changes (create, delete, link, unlink, prune) run inside a
//! tracker batch, so observers see each change as one consistent step.
//!
//! # Lock order
//!
//! Repository state, then the edge index, then the tracker. Schemas and the
//! id registry are leaves and never wait on anything else.

mod edges;
mod id;
mod model;
mod node;
mod repository;
mod retention;
mod schema;
mod snapshot;
mod typed;
mod value;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::reactive::Tracker;

pub use id::{Id, IdSource, RandomIds};
pub use model::{FieldSpec, InitialValues, ModelBuilder, ModelSpec, Presence};
pub use node::Node;
pub use repository::Repository;
pub use retention::PruneReport;
pub use schema::{EdgeKind, SchemaDescriptor};
pub use snapshot::{EdgeSnapshot, NodeSnapshot, RepositorySnapshot};
pub use typed::{Model, TypedRepository};
pub use value::{FieldValue, Value, ValueKind};

use edges::EdgeIndex;
use node::WeakNode;
use repository::RepositoryInner;

/// A registered identifier.
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) model: Arc<str>,
    pub(crate) node: WeakNode,
}

pub(crate) struct StoreInner {
    pub(crate) config: StoreConfig,
    pub(crate) tracker: Tracker,
    pub(crate) ids: DashMap<Id, Registration>,
    pub(crate) edges: Mutex<EdgeIndex>,
    pub(crate) id_source: Box<dyn IdSource>,
    repositories: Mutex<HashMap<String, Weak<RepositoryInner>>>,
}

impl StoreInner {
    /// Look up a live node by identifier, in any repository.
    pub(crate) fn node(&self, id: Id) -> Option<Node> {
        let node = self.ids.get(&id)?.node.upgrade()?;
        node.is_live().then_some(node)
    }

    /// Live repositories, in model-name order.
    pub(crate) fn repositories(&self) -> Vec<Arc<RepositoryInner>> {
        let registry = self.repositories.lock();
        let mut live: Vec<(String, Arc<RepositoryInner>)> = registry
            .iter()
            .filter_map(|(name, weak)| weak.upgrade().map(|repository| (name.clone(), repository)))
            .collect();
        drop(registry);
        live.sort_by(|a, b| a.0.cmp(&b.0));
        live.into_iter().map(|(_, repository)| repository).collect()
    }
}

/// Handle to an object-graph store. Clones share the same store.
///
/// # Example
///
/// ```rust
/// use lattice_store::store::{InitialValues, ModelBuilder, Value, ValueKind};
/// use lattice_store::Store;
///
/// let store = Store::new();
/// let items = store
///     .repository(
///         ModelBuilder::new("Item")
///             .required("title", ValueKind::Text)
///             .optional("description", ValueKind::Text)
///             .required_with_default("completed", false)
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
///
/// let item = items.create(InitialValues::new().with("title", "x")).unwrap();
/// let id = items.identifier_of(&item);
/// assert_eq!(items.get(id).unwrap().get::<String>("title").unwrap(), "x");
///
/// items.delete(&item).unwrap();
/// assert!(items.get(id).is_none());
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self::with_id_source(config, RandomIds)
    }

    /// Create a store that draws identifiers from `source`.
    pub fn with_id_source(config: StoreConfig, source: impl IdSource + 'static) -> Self {
        let tracker = Tracker::with_max_rounds(config.max_flush_rounds);
        debug!(?config, "store created");
        Self {
            inner: Arc::new(StoreInner {
                config,
                tracker,
                ids: DashMap::new(),
                edges: Mutex::new(EdgeIndex::new()),
                id_source: Box::new(source),
                repositories: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The tracker every cell in this store reports to.
    pub fn tracker(&self) -> &Tracker {
        &self.inner.tracker
    }

    /// Open the repository for `model`.
    ///
    /// At most one repository per model name may be alive at a time.
    pub fn repository(&self, model: ModelSpec) -> Result<Repository> {
        let mut registry = self.inner.repositories.lock();
        if let Some(existing) = registry.get(model.name()).and_then(Weak::upgrade) {
            if !existing.is_disposed() {
                return Err(StoreError::DuplicateRepository(model.name().to_owned()));
            }
        }

        let name = model.name().to_owned();
        let repository = Repository::open(Arc::clone(&self.inner), model);
        registry.insert(name.clone(), repository.downgrade());
        debug!(model = %name, "repository opened");
        Ok(repository)
    }

    /// Open a typed repository for `M`.
    pub fn typed<M: Model>(&self) -> Result<TypedRepository<M>> {
        TypedRepository::open(self)
    }

    /// Look up a live node in any repository.
    pub fn node(&self, id: Id) -> Option<Node> {
        self.inner.node(id)
    }

    pub fn contains(&self, id: Id) -> bool {
        self.node(id).is_some()
    }

    /// The model name a live identifier is registered under.
    pub fn model_of(&self, id: Id) -> Option<String> {
        self.inner.ids.get(&id).map(|registration| registration.model.to_string())
    }

    /// Number of live nodes across all repositories.
    pub fn node_count(&self) -> usize {
        self.inner.ids.len()
    }

    /// Number of edges across all repositories.
    pub fn edge_count(&self) -> usize {
        self.inner.edges.lock().len()
    }

    /// Run `f` as one propagation batch.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.tracker.batch(f)
    }

    /// Remove everything no root reaches. See [`PruneReport`].
    pub fn prune(&self) -> PruneReport {
        retention::prune(&self.inner)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
