//! Observer Implementation
//!
//! An Observer is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Observers Work
//!
//! 1. When created, the observer runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the observer is queued in the current
//!    batch and runs once when the batch flushes, after every memo it reads
//!    has settled.
//!
//! 3. Each run replaces the previous dependency set with the cells read
//!    during that run.
//!
//! # Differences from Memo
//!
//! - Memos return a value; observers do not.
//! - Memos recompute lazily on access; observers only run when flushed.
//! - Memos cache results; observers just run their side effect.
//!
//! # Disposal
//!
//! Disposing an observer removes its dependency edges and cancels a pending
//! run, even in the middle of a flush. Dropping the last handle disposes it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use super::context::ReactiveContext;
use super::tracker::{Reactive, Tracker};
use crate::graph::{NodeKind, ReactiveId};

type Run = Box<dyn Fn(&ReactiveContext) + Send + Sync>;

struct ObserverInner {
    id: ReactiveId,
    tracker: Tracker,
    run: Run,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl ObserverInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.tracker.run(self.id, |cx| (self.run)(cx));
        self.run_count.fetch_add(1, Ordering::SeqCst);
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.tracker.dispose(self.id);
        }
    }
}

impl Reactive for ObserverInner {
    fn reactive_id(&self) -> ReactiveId {
        self.id
    }

    fn evaluate(&self) -> bool {
        self.execute();
        true
    }
}

impl Drop for ObserverInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use lattice_store::reactive::{Cell, Observer, Tracker};
///
/// let tracker = Tracker::new();
/// let count = Cell::new(&tracker, 0);
///
/// let source = count.clone();
/// let observer = Observer::new(&tracker, move |cx| {
///     let _ = source.read(Some(cx));
/// });
///
/// count.write(5);
/// assert_eq!(observer.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Observer {
    inner: Arc<ObserverInner>,
}

impl Observer {
    /// Create a new observer with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(tracker: &Tracker, run: F) -> Self
    where
        F: Fn(&ReactiveContext) + Send + Sync + 'static,
    {
        let observer = Self::new_lazy(tracker, run);
        observer.execute();
        observer
    }

    /// Create a new observer without running it immediately.
    ///
    /// It has no dependencies until the first [`Observer::execute`].
    pub fn new_lazy<F>(tracker: &Tracker, run: F) -> Self
    where
        F: Fn(&ReactiveContext) + Send + Sync + 'static,
    {
        let inner = Arc::new(ObserverInner {
            id: ReactiveId::new(),
            tracker: tracker.clone(),
            run: Box::new(run),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        let weak: Weak<dyn Reactive> = Arc::downgrade(&inner) as Weak<dyn Reactive>;
        tracker.register(NodeKind::Observer, weak, inner.id);
        Self { inner }
    }

    pub fn id(&self) -> ReactiveId {
        self.inner.id
    }

    /// Run the observer function now, re-collecting its dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Dispose of the observer.
    ///
    /// After disposal, the observer will not run again.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the observer has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of cells and memos the observer currently reads.
    pub fn dependency_count(&self) -> usize {
        self.inner.tracker.dependency_count(self.inner.id)
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
