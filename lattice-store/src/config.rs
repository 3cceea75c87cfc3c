//! Store Configuration
//!
//! Knobs that change policy rather than algorithms. Every field has a
//! default, so an empty JSON object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What `delete` does with edges that point at the node being deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    /// Remove referencing edges, unless one of them is sticky, in which case
    /// the delete is refused with `StickyReferenceViolation`.
    #[default]
    RemoveUnlessSticky,

    /// Refuse to delete any node that is still referenced.
    Restrict,
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Policy for edges targeting a deleted node.
    pub cascade: CascadePolicy,

    /// Upper bound on propagation rounds in a single flush. Each round is
    /// started by cells that observers wrote during the previous one.
    pub max_flush_rounds: usize,

    /// How many fresh identifiers `create` tries after a collision before
    /// giving up with `IdCollision`.
    pub id_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cascade: CascadePolicy::default(),
            max_flush_rounds: 100,
            id_retries: 0,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_cascade(mut self, cascade: CascadePolicy) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_max_flush_rounds(mut self, rounds: usize) -> Self {
        self.max_flush_rounds = rounds.max(1);
        self
    }

    pub fn with_id_retries(mut self, retries: u32) -> Self {
        self.id_retries = retries;
        self
    }
}
