//! Typed Models
//!
//! A [`Model`] is a hand-written wrapper around a [`Node`] that gives it
//! typed accessors. [`TypedRepository`] wraps a [`Repository`] and hands
//! out those wrappers instead of raw nodes. Both delegate everything to the
//! untyped layer.
//!
//! # Example
//!
//! ```rust
//! use lattice_store::store::{InitialValues, Model, ModelBuilder, Node, ValueKind};
//! use lattice_store::{Result, Store};
//!
//! struct Item(Node);
//!
//! impl Item {
//!     fn title(&self) -> Result<String> {
//!         self.0.get("title")
//!     }
//! }
//!
//! impl Model for Item {
//!     fn describe() -> ModelBuilder {
//!         ModelBuilder::new("Item").required("title", ValueKind::Text)
//!     }
//!
//!     fn from_node(node: Node) -> Self {
//!         Item(node)
//!     }
//!
//!     fn node(&self) -> &Node {
//!         &self.0
//!     }
//! }
//!
//! let store = Store::new();
//! let items = store.typed::<Item>().unwrap();
//! let item = items.create(InitialValues::new().with("title", "x")).unwrap();
//! assert_eq!(item.title().unwrap(), "x");
//! ```

use std::marker::PhantomData;

use crate::error::Result;

use super::id::Id;
use super::model::{InitialValues, ModelBuilder};
use super::node::Node;
use super::repository::Repository;
use super::schema::{EdgeKind, SchemaDescriptor};
use super::Store;

/// A typed view of one model's nodes.
pub trait Model: Sized {
    /// Describe the fields and schema of this model.
    fn describe() -> ModelBuilder;

    fn from_node(node: Node) -> Self;

    fn node(&self) -> &Node;

    fn id(&self) -> Id {
        self.node().id()
    }
}

/// A [`Repository`] that speaks in `M` instead of [`Node`].
pub struct TypedRepository<M: Model> {
    repository: Repository,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> TypedRepository<M> {
    pub(crate) fn open(store: &Store) -> Result<Self> {
        let spec = M::describe().build()?;
        Ok(Self::new(store.repository(spec)?))
    }

    /// Wrap an untyped repository. The caller vouches that it holds `M`s.
    pub fn new(repository: Repository) -> Self {
        Self {
            repository,
            _model: PhantomData,
        }
    }

    /// The untyped repository underneath.
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn init_schema(&self) -> Result<SchemaDescriptor> {
        self.repository.init_schema()
    }

    pub fn create(&self, initial: InitialValues) -> Result<M> {
        self.repository.create(initial).map(M::from_node)
    }

    pub fn get(&self, id: Id) -> Option<M> {
        self.repository.get(id).map(M::from_node)
    }

    pub fn delete(&self, model: &M) -> Result<bool> {
        self.repository.delete(model.node())
    }

    pub fn identifier_of(&self, model: &M) -> Id {
        self.repository.identifier_of(model.node())
    }

    pub fn link(&self, model: &M, kind: impl Into<EdgeKind>, target: Id) -> Result<bool> {
        self.repository.link(model.node(), kind, target)
    }

    pub fn unlink(&self, model: &M, kind: impl Into<EdgeKind>, target: Id) -> Result<bool> {
        self.repository.unlink(model.node(), kind, target)
    }

    /// Every live `M`, in creation order.
    pub fn all(&self) -> Vec<M> {
        self.repository.nodes().into_iter().map(M::from_node).collect()
    }

    pub fn len(&self) -> usize {
        self.repository.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repository.is_empty()
    }
}

impl<M: Model> Clone for TypedRepository<M> {
    fn clone(&self) -> Self {
        Self::new(self.repository.clone())
    }
}

impl<M: Model> std::fmt::Debug for TypedRepository<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TypedRepository").field(&self.repository).finish()
    }
}
