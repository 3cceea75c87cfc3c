//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the memo is marked dirty in the tracker's
//!    graph (or maybe dirty, if the change is further upstream).
//!
//! 4. The next flush re-evaluates it in dependency order. Reading it before
//!    then recomputes on the spot, so a read in the middle of a batch never
//!    sees a stale derived value.
//!
//! 5. Dependents are only disturbed when the recomputed value differs from
//!    the cached one.
//!
//! # Thread Safety
//!
//! Memos are thread-safe. The cached value is protected by a lock, which is
//! not held while the computation runs.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::tracker::{Reactive, Tracker};
use crate::graph::{DirtyState, NodeKind, ReactiveId};

type Compute<T> = Box<dyn Fn(&ReactiveContext) -> T + Send + Sync>;

struct MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    id: ReactiveId,
    tracker: Tracker,
    compute: Compute<T>,
    value: RwLock<Option<T>>,
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Run the computation and cache the result.
    ///
    /// Returns the new value and whether it differs from the cached one.
    fn recompute(&self) -> (T, bool) {
        let next = self.tracker.run(self.id, |cx| (self.compute)(cx));

        let mut slot = self.value.write();
        let changed = slot.as_ref() != Some(&next);
        *slot = Some(next.clone());
        (next, changed)
    }

    fn is_stale(&self) -> bool {
        self.value.read().is_none()
            || !matches!(self.tracker.dirty_state(self.id), Some(DirtyState::Clean))
    }
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn reactive_id(&self) -> ReactiveId {
        self.id
    }

    fn evaluate(&self) -> bool {
        self.recompute().1
    }
}

impl<T> Drop for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn drop(&mut self) {
        self.tracker.dispose(self.id);
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The `PartialEq` bound lets the memo detect when the computed value
/// actually changed; some inputs change without changing the output.
///
/// # Example
///
/// ```rust
/// use lattice_store::reactive::{Cell, Memo, Tracker};
///
/// let tracker = Tracker::new();
/// let count = Cell::new(&tracker, 2);
///
/// let source = count.clone();
/// let doubled = Memo::new(&tracker, move |cx| source.read(Some(cx)) * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.write(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(tracker: &Tracker, compute: F) -> Self
    where
        F: Fn(&ReactiveContext) -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            id: ReactiveId::new(),
            tracker: tracker.clone(),
            compute: Box::new(compute),
            value: RwLock::new(None),
        });
        let weak: Weak<dyn Reactive> = Arc::downgrade(&inner) as Weak<dyn Reactive>;
        tracker.register(NodeKind::Derived, weak, inner.id);
        Self { inner }
    }

    pub fn id(&self) -> ReactiveId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary, and register the
    /// active computation as a dependent.
    pub fn get(&self) -> T {
        self.inner.tracker.track_ambient(self.inner.id);
        self.current()
    }

    /// Like [`Memo::get`], but tracks through an explicit context.
    pub fn read(&self, cx: Option<&ReactiveContext>) -> T {
        if let Some(cx) = cx {
            cx.track(self.inner.id);
        }
        self.current()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.current()
    }

    fn current(&self) -> T {
        if !self.inner.is_stale() {
            if let Some(value) = self.inner.value.read().as_ref() {
                return value.clone();
            }
        }

        let (value, changed) = self.inner.recompute();
        if changed {
            self.inner.tracker.notify_write(self.inner.id);
        }
        value
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Get the current dirty state, `None` once unregistered.
    pub fn state(&self) -> Option<DirtyState> {
        self.inner.tracker.dirty_state(self.inner.id)
    }

    /// Get the number of computations reading this memo.
    pub fn dependent_count(&self) -> usize {
        self.inner.tracker.dependent_count(self.inner.id)
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}
