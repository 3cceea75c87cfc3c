//! Error types for the store.
//!
//! Every rejecting operation leaves the store exactly as it was before the
//! call. Looking up an unknown identifier is not an error; it yields `None`.

use thiserror::Error;

use crate::store::{EdgeKind, Id, ValueKind};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Top-level error type for the store.
///
/// Edge endpoints are named `origin` and `target`; `source` is reserved by
/// `thiserror` for error chaining.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The identifier source produced an identifier that is already live.
    /// Retrying with a fresh identifier may succeed.
    #[error("identifier collision: {0} is already in use")]
    IdCollision(Id),

    #[error("invalid initial value for {model}.{field}: {reason}")]
    InvalidInitialValue {
        model: String,
        field: String,
        reason: String,
    },

    #[error("invalid schema for {model}: {reason}")]
    InvalidSchema { model: String, reason: String },

    #[error("edge {origin} -[{kind}]-> {target} would close a cycle")]
    CycleViolation {
        kind: EdgeKind,
        origin: Id,
        target: Id,
    },

    #[error("cannot delete {target}: sticky edge {origin} -[{kind}]-> {target} references it")]
    StickyReferenceViolation {
        target: Id,
        origin: Id,
        kind: EdgeKind,
    },

    #[error("cannot delete {id}: referenced by {count} edge(s)")]
    ReferencedNode { id: Id, count: usize },

    #[error("unknown field {model}.{field}")]
    UnknownField { model: String, field: String },

    #[error("type mismatch for {model}.{field}: expected {expected}, found {found}")]
    TypeMismatch {
        model: String,
        field: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("{model}.{field} is absent")]
    AbsentValue { model: String, field: String },

    #[error("{model}.{field} is required and cannot be cleared")]
    RequiredField { model: String, field: String },

    #[error("unknown node {0}")]
    UnknownNode(Id),

    #[error("node {id} belongs to {found}, not {expected}")]
    ForeignNode {
        id: Id,
        expected: String,
        found: String,
    },

    #[error("a repository for {0} already exists")]
    DuplicateRepository(String),

    #[error("repository for {0} has been disposed")]
    RepositoryDisposed(String),

    #[error("propagation did not settle after {rounds} rounds")]
    PropagationLimit { rounds: usize },

    #[error("snapshot codec error: {0}")]
    Codec(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}
