//! Optional Cell
//!
//! A cell whose value may be absent. Absence is an ordinary, observable
//! state: clearing the cell notifies dependents like any other change, and
//! the cell itself keeps existing.

use std::fmt::Debug;

use super::cell::Cell;
use super::context::ReactiveContext;
use super::tracker::Tracker;
use crate::graph::ReactiveId;

/// A reactive cell holding either a `T` or nothing.
pub struct OptionalCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Cell<Option<T>>,
}

impl<T> OptionalCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    pub fn new(tracker: &Tracker, value: Option<T>) -> Self {
        Self {
            inner: Cell::new(tracker, value),
        }
    }

    /// Create a cell that starts out absent.
    pub fn absent(tracker: &Tracker) -> Self {
        Self::new(tracker, None)
    }

    pub fn id(&self) -> ReactiveId {
        self.inner.id()
    }

    /// Read the current value; see [`Cell::read`].
    pub fn read(&self, cx: Option<&ReactiveContext>) -> Option<T> {
        self.inner.read(cx)
    }

    pub fn get(&self) -> Option<T> {
        self.inner.get()
    }

    pub fn get_untracked(&self) -> Option<T> {
        self.inner.get_untracked()
    }

    /// Whether a value is present, tracking ambiently.
    pub fn is_present(&self) -> bool {
        self.inner.with(Option::is_some)
    }

    /// Replace the value or clear it. Returns whether anything changed.
    pub fn write(&self, value: Option<T>) -> bool {
        self.inner.write(value)
    }

    pub fn set(&self, value: T) -> bool {
        self.inner.write(Some(value))
    }

    /// Make the value absent without removing the cell.
    pub fn clear(&self) -> bool {
        self.inner.write(None)
    }

    pub fn version(&self) -> u64 {
        self.inner.version()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    pub fn retain(&self) {
        self.inner.retain();
    }

    pub fn is_retained(&self) -> bool {
        self.inner.is_retained()
    }

    pub fn release(&self) -> bool {
        self.inner.release()
    }

    pub fn detach(&self) {
        self.inner.detach();
    }

    pub fn is_detached(&self) -> bool {
        self.inner.is_detached()
    }
}

impl<T> Clone for OptionalCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for OptionalCell<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionalCell")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("version", &self.version())
            .finish()
    }
}
