//! Reactive Primitives
//!
//! This module implements the reactive engine beneath the store: cells,
//! memos, observers, and the tracker that connects them.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Cell`] is a container for mutable state. When a cell's value is read
//! within a tracking context (such as a memo or observer), the cell registers
//! that context as a dependent. When the cell's value changes, all dependents
//! are queued for re-evaluation. [`OptionalCell`] is the same thing for
//! values that may be absent.
//!
//! ## Memos
//!
//! A [`Memo`] is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes, and only disturbs its own dependents
//! when its value actually changed.
//!
//! ## Observers
//!
//! An [`Observer`] is a side-effecting computation that runs whenever its
//! dependencies change. Observers are how the outside world (UI bindings,
//! logging) learns about changes.
//!
//! ## Batches
//!
//! Writes are synchronous, notification is not. Writes inside
//! [`Tracker::batch`] accumulate dirty computations, which run once each,
//! in dependency order, when the batch closes. Nothing ever runs against a
//! half-updated set of inputs.
//!
//! # Implementation Notes
//!
//! Reads are tracked through a [`ReactiveContext`], an activation frame the
//! tracker pushes while a computation runs. Computations receive the context
//! explicitly and may pass it to `read`; `get` uses whatever context is on
//! top of the calling thread's stack in the tracker.

mod cell;
mod context;
mod memo;
mod observer;
mod optional;
mod tracker;

pub use cell::Cell;
pub use context::ReactiveContext;
pub use memo::Memo;
pub use observer::Observer;
pub use optional::OptionalCell;
pub use tracker::{BatchGuard, Reactive, Tracker, DEFAULT_MAX_ROUNDS};
