//! Nodes
//!
//! A [`Node`] is one model instance: an identifier, one reactive cell per
//! declared field, and its outgoing edges. Handles are cheap clones of a
//! shared node.
//!
//! Field reads go through the cells, so reading a field inside a memo or
//! observer subscribes to it. Reading a node's edges subscribes to the node's
//! edge revision, which changes whenever an edge is added or removed on it.
//! Incoming edges have a revision of their own, so [`Node::sources`] is
//! reactive as well.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::reactive::{Cell, OptionalCell, ReactiveContext, Tracker};

use super::id::Id;
use super::model::{FieldSpec, ModelSpec, Presence};
use super::schema::{EdgeKind, Schema};
use super::value::{FieldValue, Value};
use super::StoreInner;

/// The reactive cell behind one field.
pub(crate) enum Field {
    Required(Cell<Value>),
    Optional(OptionalCell<Value>),
}

impl Field {
    fn new(tracker: &Tracker, model: &ModelSpec, spec: &FieldSpec, value: Option<Value>) -> Result<Self> {
        match (spec.presence, value) {
            (Presence::Required, Some(value)) => Ok(Field::Required(Cell::new(tracker, value))),
            (Presence::Required, None) => Err(StoreError::InvalidInitialValue {
                model: model.name().to_owned(),
                field: spec.name.clone(),
                reason: "required field has no value".to_owned(),
            }),
            (Presence::Optional, value) => Ok(Field::Optional(OptionalCell::new(tracker, value))),
        }
    }

    fn read(&self, cx: Option<&ReactiveContext>) -> Option<Value> {
        match self {
            Field::Required(cell) => Some(cell.read(cx)),
            Field::Optional(cell) => cell.read(cx),
        }
    }

    fn get(&self) -> Option<Value> {
        match self {
            Field::Required(cell) => Some(cell.get()),
            Field::Optional(cell) => cell.get(),
        }
    }

    fn get_untracked(&self) -> Option<Value> {
        match self {
            Field::Required(cell) => Some(cell.get_untracked()),
            Field::Optional(cell) => cell.get_untracked(),
        }
    }

    fn version(&self) -> u64 {
        match self {
            Field::Required(cell) => cell.version(),
            Field::Optional(cell) => cell.version(),
        }
    }

    fn subscriber_count(&self) -> usize {
        match self {
            Field::Required(cell) => cell.subscriber_count(),
            Field::Optional(cell) => cell.subscriber_count(),
        }
    }

    fn retain(&self) {
        match self {
            Field::Required(cell) => cell.retain(),
            Field::Optional(cell) => cell.retain(),
        }
    }

    fn is_retained(&self) -> bool {
        match self {
            Field::Required(cell) => cell.is_retained(),
            Field::Optional(cell) => cell.is_retained(),
        }
    }

    fn release(&self) -> bool {
        match self {
            Field::Required(cell) => cell.release(),
            Field::Optional(cell) => cell.release(),
        }
    }

    fn detach(&self) {
        match self {
            Field::Required(cell) => cell.detach(),
            Field::Optional(cell) => cell.detach(),
        }
    }
}

pub(crate) struct NodeInner {
    id: Id,
    model: Arc<ModelSpec>,
    schema: Arc<RwLock<Schema>>,
    fields: IndexMap<String, Field>,
    /// Edge revision; bumped whenever an outgoing edge is added or removed.
    links: Cell<u64>,
    /// Bumped whenever an incoming edge is added or removed.
    backlinks: Cell<u64>,
    store: Arc<StoreInner>,
    deleted: AtomicBool,
}

/// Handle to one model instance. Clones refer to the same node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// Non-owning node handle kept by the store's identifier registry.
#[derive(Clone)]
pub(crate) struct WeakNode(Weak<NodeInner>);

impl WeakNode {
    pub(crate) fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(|inner| Node { inner })
    }
}

impl Node {
    /// Build a node from resolved values. Nothing is registered yet.
    pub(crate) fn build(
        id: Id,
        model: Arc<ModelSpec>,
        schema: Arc<RwLock<Schema>>,
        store: Arc<StoreInner>,
        mut values: IndexMap<String, Option<Value>>,
    ) -> Result<Self> {
        let tracker = store.tracker.clone();
        let mut fields = IndexMap::with_capacity(values.len());
        for spec in model.fields() {
            let value = values.shift_remove(&spec.name).flatten();
            fields.insert(spec.name.clone(), Field::new(&tracker, &model, spec, value)?);
        }

        Ok(Self {
            inner: Arc::new(NodeInner {
                id,
                model,
                schema,
                fields,
                links: Cell::new(&tracker, 0),
                backlinks: Cell::new(&tracker, 0),
                store,
                deleted: AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> Id {
        self.inner.id
    }

    pub fn model(&self) -> &ModelSpec {
        &self.inner.model
    }

    pub fn model_name(&self) -> &str {
        self.inner.model.name()
    }

    /// Whether the node is still registered with its repository.
    pub fn is_live(&self) -> bool {
        !self.inner.deleted.load(Ordering::SeqCst)
    }

    /// Whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn field(&self, name: &str) -> Result<&Field> {
        self.inner
            .fields
            .get(name)
            .ok_or_else(|| StoreError::UnknownField {
                model: self.model_name().to_owned(),
                field: name.to_owned(),
            })
    }

    // ------------------------------------------------------------------
    // Field reads
    // ------------------------------------------------------------------

    /// Read a field. `None` means the field is absent.
    ///
    /// With `Some(cx)`, the context's computation subscribes to the field.
    pub fn read(&self, field: &str, cx: Option<&ReactiveContext>) -> Result<Option<Value>> {
        Ok(self.field(field)?.read(cx))
    }

    /// Read a field, subscribing whatever computation is currently running.
    pub fn value(&self, field: &str) -> Result<Option<Value>> {
        Ok(self.field(field)?.get())
    }

    /// Read a present field as `T`.
    pub fn get<T: FieldValue>(&self, field: &str) -> Result<T> {
        self.get_optional(field)?.ok_or_else(|| StoreError::AbsentValue {
            model: self.model_name().to_owned(),
            field: field.to_owned(),
        })
    }

    /// Read a field as `T`, or `None` if it is absent.
    pub fn get_optional<T: FieldValue>(&self, field: &str) -> Result<Option<T>> {
        match self.value(field)? {
            None => Ok(None),
            Some(value) => T::from_value(&value)
                .map(Some)
                .ok_or_else(|| StoreError::TypeMismatch {
                    model: self.model_name().to_owned(),
                    field: field.to_owned(),
                    expected: T::KIND,
                    found: value.kind(),
                }),
        }
    }

    /// Number of committed changes to a field.
    pub fn version(&self, field: &str) -> Result<u64> {
        Ok(self.field(field)?.version())
    }

    /// Every field's current value, without subscribing.
    pub fn values(&self) -> IndexMap<String, Option<Value>> {
        self.inner
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.get_untracked()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Field writes
    // ------------------------------------------------------------------

    /// Write a field, or clear it with `None`.
    ///
    /// Returns whether the value changed. Writing an equal value notifies
    /// nobody.
    pub fn write(&self, field: &str, value: Option<Value>) -> Result<bool> {
        if !self.is_live() {
            return Err(StoreError::UnknownNode(self.id()));
        }
        let cell = self.field(field)?;
        let spec = self.inner.model.field(field).ok_or_else(|| StoreError::UnknownField {
            model: self.model_name().to_owned(),
            field: field.to_owned(),
        })?;
        if let Some(value) = &value {
            if value.kind() != spec.kind {
                return Err(StoreError::TypeMismatch {
                    model: self.model_name().to_owned(),
                    field: field.to_owned(),
                    expected: spec.kind,
                    found: value.kind(),
                });
            }
        }

        match (cell, value) {
            (Field::Required(cell), Some(value)) => Ok(cell.write(value)),
            (Field::Required(_), None) => Err(StoreError::RequiredField {
                model: self.model_name().to_owned(),
                field: field.to_owned(),
            }),
            (Field::Optional(cell), value) => Ok(cell.write(value)),
        }
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<bool> {
        self.write(field, Some(value.into()))
    }

    /// Make an optional field absent.
    pub fn clear(&self, field: &str) -> Result<bool> {
        self.write(field, None)
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Targets of this node's `kind` edges, in insertion order.
    ///
    /// Subscribes the running computation to this node's edges.
    pub fn targets(&self, kind: impl Into<EdgeKind>) -> Vec<Id> {
        self.inner.links.get();
        self.inner.store.edges.lock().targets(self.id(), &kind.into())
    }

    /// Like [`Node::targets`], subscribing `cx` explicitly.
    pub fn read_targets(&self, kind: impl Into<EdgeKind>, cx: Option<&ReactiveContext>) -> Vec<Id> {
        self.inner.links.read(cx);
        self.inner.store.edges.lock().targets(self.id(), &kind.into())
    }

    /// Nodes with a `kind` edge into this one, from any repository.
    ///
    /// Subscribes the running computation to this node's incoming edges.
    pub fn sources(&self, kind: impl Into<EdgeKind>) -> Vec<Id> {
        self.inner.backlinks.get();
        self.inner.store.edges.lock().sources(self.id(), &kind.into())
    }

    pub fn read_sources(&self, kind: impl Into<EdgeKind>, cx: Option<&ReactiveContext>) -> Vec<Id> {
        self.inner.backlinks.read(cx);
        self.inner.store.edges.lock().sources(self.id(), &kind.into())
    }

    /// All outgoing edges as `(kind, target)` pairs.
    pub fn edges(&self) -> Vec<(EdgeKind, Id)> {
        self.inner.links.get();
        self.inner.store.edges.lock().outgoing(self.id())
    }

    /// Whether this node's schema keeps edges of `kind` forever.
    pub fn is_sticky_edge(&self, kind: &EdgeKind) -> bool {
        self.inner
            .schema
            .read()
            .descriptor()
            .is_some_and(|schema| schema.is_sticky_edge(kind))
    }

    // ------------------------------------------------------------------
    // Lifecycle, used by the repository and retention
    // ------------------------------------------------------------------

    pub(crate) fn downgrade(&self) -> WeakNode {
        WeakNode(Arc::downgrade(&self.inner))
    }

    /// Handles alive outside the repository map, plus the map's own.
    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn is_sticky(&self) -> bool {
        self.inner
            .schema
            .read()
            .descriptor()
            .is_some_and(|schema| schema.is_sticky_node(self.model_name()))
    }

    /// Mark the cells the schema names sticky as retained.
    pub(crate) fn retain_sticky_cells(&self) {
        let schema = self.inner.schema.read();
        let Some(descriptor) = schema.descriptor() else {
            return;
        };
        for (name, field) in &self.inner.fields {
            if descriptor.is_sticky_cell(name) {
                field.retain();
            }
        }
    }

    /// Whether any computation reads one of this node's cells or its edges.
    pub(crate) fn is_observed(&self) -> bool {
        self.inner.links.subscriber_count() > 0
            || self.inner.backlinks.subscriber_count() > 0
            || self.inner.fields.values().any(|field| field.subscriber_count() > 0)
    }

    /// Release the tracker registration of every unobserved, unretained cell.
    pub(crate) fn release_cells(&self) -> usize {
        self.inner
            .fields
            .values()
            .filter(|field| !field.is_retained())
            .filter(|field| field.release())
            .count()
    }

    pub(crate) fn bump_links(&self) {
        self.inner.links.update(|revision| revision + 1);
    }

    pub(crate) fn bump_backlinks(&self) {
        self.inner.backlinks.update(|revision| revision + 1);
    }

    /// Mark the node deleted and cut its cells loose from the tracker.
    pub(crate) fn detach(&self) {
        if self.inner.deleted.swap(true, Ordering::SeqCst) {
            return;
        }
        for field in self.inner.fields.values() {
            field.detach();
        }
        self.inner.links.detach();
        self.inner.backlinks.detach();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("model", &self.model_name())
            .field("values", &self.values())
            .field("live", &self.is_live())
            .finish()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}
