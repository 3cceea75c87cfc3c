//! Repository Snapshots
//!
//! A snapshot is a plain serde value: the model name, the adopted schema,
//! and for every node its field values and outgoing edges. MessagePack is
//! the compact form; JSON is there for inspection and fixtures.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

use super::id::Id;
use super::model::InitialValues;
use super::schema::{EdgeKind, SchemaDescriptor};
use super::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub kind: EdgeKind,
    pub target: Id,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: Id,
    pub values: IndexMap<String, Option<Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<EdgeSnapshot>,
}

impl NodeSnapshot {
    pub(crate) fn initial_values(&self) -> InitialValues {
        let mut initial = InitialValues::new();
        for (field, value) in &self.values {
            initial.set(field.clone(), value.clone());
        }
        initial
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub model: String,
    pub schema: SchemaDescriptor,
    pub nodes: Vec<NodeSnapshot>,
}

impl RepositorySnapshot {
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| StoreError::Codec(err.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| StoreError::Codec(err.to_string()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
