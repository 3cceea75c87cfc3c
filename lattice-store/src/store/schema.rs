//! Retention and integrity policy per node type.
//!
//! A [`SchemaDescriptor`] is four sets:
//!
//! - sticky nodes: model names whose instances are never pruned
//! - sticky cells: fields exempt from pruning
//! - sticky edges: edge kinds exempt from pruning, which also pin their
//!   targets against deletion
//! - acyclic edges: edge kinds that may never form a directed cycle
//!
//! A repository adopts a descriptor once. Adopting the same descriptor again
//! is a no-op; a different one is rejected.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

use super::model::ModelSpec;

/// The label of a typed edge.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeKind(Arc<str>);

impl EdgeKind {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeKind({})", self.0)
    }
}

impl From<&str> for EdgeKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EdgeKind {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// The policy sets a repository is initialized with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDescriptor {
    pub sticky_nodes: BTreeSet<String>,
    pub sticky_cells: BTreeSet<String>,
    pub sticky_edges: BTreeSet<EdgeKind>,
    pub acyclic_edges: BTreeSet<EdgeKind>,
}

impl SchemaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sticky_node(mut self, model: impl Into<String>) -> Self {
        self.sticky_nodes.insert(model.into());
        self
    }

    pub fn sticky_cell(mut self, field: impl Into<String>) -> Self {
        self.sticky_cells.insert(field.into());
        self
    }

    pub fn sticky_edge(mut self, kind: impl Into<EdgeKind>) -> Self {
        self.sticky_edges.insert(kind.into());
        self
    }

    pub fn acyclic(mut self, kind: impl Into<EdgeKind>) -> Self {
        self.acyclic_edges.insert(kind.into());
        self
    }

    pub fn is_sticky_node(&self, model: &str) -> bool {
        self.sticky_nodes.contains(model)
    }

    pub fn is_sticky_cell(&self, field: &str) -> bool {
        self.sticky_cells.contains(field)
    }

    pub fn is_sticky_edge(&self, kind: &EdgeKind) -> bool {
        self.sticky_edges.contains(kind)
    }

    pub fn is_acyclic(&self, kind: &EdgeKind) -> bool {
        self.acyclic_edges.contains(kind)
    }

    /// Check the descriptor against the model it is declared for.
    pub fn validate(&self, model: &ModelSpec) -> Result<()> {
        let invalid = |reason: String| StoreError::InvalidSchema {
            model: model.name().to_owned(),
            reason,
        };

        if let Some(other) = self.sticky_nodes.iter().find(|name| *name != model.name()) {
            return Err(invalid(format!("sticky node set names foreign type {other}")));
        }
        if let Some(field) = self
            .sticky_cells
            .iter()
            .find(|field| model.field(field).is_none())
        {
            return Err(invalid(format!("sticky cell {field} is not a field")));
        }
        Ok(())
    }
}

/// Per-repository schema state: the adopted descriptor, if any.
#[derive(Debug, Default)]
pub(crate) struct Schema {
    descriptor: Option<SchemaDescriptor>,
}

impl Schema {
    pub(crate) fn is_initialized(&self) -> bool {
        self.descriptor.is_some()
    }

    pub(crate) fn descriptor(&self) -> Option<&SchemaDescriptor> {
        self.descriptor.as_ref()
    }

    /// Whether `descriptor` could be adopted, without adopting it.
    ///
    /// Returns `true` if it would be a first adoption, `false` for an
    /// identical repeat.
    pub(crate) fn check(&self, model: &ModelSpec, descriptor: &SchemaDescriptor) -> Result<bool> {
        match &self.descriptor {
            Some(current) if current == descriptor => Ok(false),
            Some(_) => Err(StoreError::InvalidSchema {
                model: model.name().to_owned(),
                reason: "conflicting re-declaration".to_owned(),
            }),
            None => descriptor.validate(model).map(|()| true),
        }
    }

    /// Forget the adopted descriptor.
    pub(crate) fn reset(&mut self) {
        self.descriptor = None;
    }

    /// Adopt `descriptor` if nothing was adopted yet.
    ///
    /// Returns `true` on first adoption, `false` for an identical repeat.
    pub(crate) fn adopt(&mut self, model: &ModelSpec, descriptor: SchemaDescriptor) -> Result<bool> {
        let first = self.check(model, &descriptor)?;
        if first {
            self.descriptor = Some(descriptor);
        }
        Ok(first)
    }
}
