//! Lattice Store
//!
//! An embedded, reactive object-graph store. Application models are
//! identity-addressed nodes whose fields are observable cells, connected by
//! typed edges, with a schema that declares retention and integrity policy
//! per node type.
//!
//! It implements:
//!
//! - Reactive primitives (cells, memos, observers) with batched,
//!   glitch-free propagation
//! - Identity-addressed nodes grouped into per-model repositories
//! - Typed edges with acyclicity enforcement
//! - Schema-driven retention pruning
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Dependency graph and update scheduling
//! - `reactive`: Cells, memos, observers, and the tracker that connects them
//! - `store`: Identifiers, models, nodes, edges, repositories, retention
//! - `config`: Store-wide policy
//! - `error`: The error taxonomy
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use lattice_store::reactive::Observer;
//! use lattice_store::store::{InitialValues, ModelBuilder, ValueKind};
//! use lattice_store::Store;
//!
//! let store = Store::new();
//! let items = store
//!     .repository(
//!         ModelBuilder::new("Item")
//!             .required("title", ValueKind::Text)
//!             .required_with_default("completed", false)
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//! let item = items.create(InitialValues::new().with("title", "x")).unwrap();
//!
//! let runs = Arc::new(AtomicUsize::new(0));
//! let (watched, counter) = (item.clone(), runs.clone());
//! let _observer = Observer::new(store.tracker(), move |cx| {
//!     let _ = watched.read("title", Some(cx));
//!     let _ = watched.read("completed", Some(cx));
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! // Both writes land in one batch, so the observer runs once more
//! store.batch(|| {
//!     item.set("title", "y").unwrap();
//!     item.set("completed", true).unwrap();
//! });
//! assert_eq!(runs.load(Ordering::SeqCst), 2);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod store;

pub use config::{CascadePolicy, StoreConfig};
pub use error::{Result, StoreError};
pub use store::{Id, Node, Repository, Store};
