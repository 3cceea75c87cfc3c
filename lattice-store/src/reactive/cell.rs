//! Cell Implementation
//!
//! A Cell is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Cells Work
//!
//! 1. When a cell is read within a reactive context (memo/observer), the
//!    cell registers that context as a dependent.
//!
//! 2. When a cell is written with a value that differs from the current
//!    one, its version is bumped and all dependents are queued in the
//!    current batch.
//!
//! 3. Writing an equal value is a no-op: no version bump, no notification.
//!
//! # Thread Safety
//!
//! Cells are thread-safe. The value is protected by a RwLock and dependency
//! bookkeeping lives in the owning [`Tracker`].

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::tracker::Tracker;
use crate::graph::ReactiveId;

/// Lifecycle flags shared by all clones of a cell.
#[derive(Debug, Default)]
struct CellFlags {
    /// Exempt from retention pruning.
    retained: AtomicBool,
    /// Cut loose from the tracker; reads no longer register dependents.
    detached: AtomicBool,
}

/// A reactive cell that always holds a value of type `T`.
///
/// # Example
///
/// ```rust
/// use lattice_store::reactive::{Cell, Tracker};
///
/// let tracker = Tracker::new();
/// let count = Cell::new(&tracker, 0);
///
/// assert!(count.write(5));
/// assert!(!count.write(5));
/// assert_eq!(count.get(), 5);
/// assert_eq!(count.version(), 1);
/// ```
pub struct Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: ReactiveId,
    tracker: Tracker,
    value: Arc<RwLock<T>>,
    version: Arc<AtomicU64>,
    flags: Arc<CellFlags>,
    eq: fn(&T, &T) -> bool,
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new cell with the given initial value.
    ///
    /// Writes are compared with `PartialEq`.
    pub fn new(tracker: &Tracker, value: T) -> Self {
        Self::with_eq(tracker, value, <T as PartialEq>::eq)
    }
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new cell that uses `eq` to decide whether a write changes it.
    pub fn with_eq(tracker: &Tracker, value: T, eq: fn(&T, &T) -> bool) -> Self {
        Self {
            id: ReactiveId::new(),
            tracker: tracker.clone(),
            value: Arc::new(RwLock::new(value)),
            version: Arc::new(AtomicU64::new(0)),
            flags: Arc::new(CellFlags::default()),
            eq,
        }
    }

    pub fn id(&self) -> ReactiveId {
        self.id
    }

    /// Read the current value.
    ///
    /// With `Some(cx)`, the context's computation becomes a dependent of
    /// this cell. With `None`, the read is untracked.
    pub fn read(&self, cx: Option<&ReactiveContext>) -> T {
        if let Some(cx) = cx {
            self.track_with(cx);
        }
        self.value.read().clone()
    }

    /// Read the current value, registering whatever computation is currently
    /// active on the tracker.
    pub fn get(&self) -> T {
        self.track_ambient();
        self.value.read().clone()
    }

    /// Read the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Borrow the current value, tracking ambiently.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track_ambient();
        f(&*self.value.read())
    }

    /// Replace the value.
    ///
    /// Returns `false` and notifies nobody if `value` equals the current one.
    pub fn write(&self, value: T) -> bool {
        {
            let mut guard = self.value.write();
            if (self.eq)(&*guard, &value) {
                return false;
            }
            *guard = value;
        }
        self.version.fetch_add(1, Ordering::SeqCst);

        if !self.is_detached() {
            self.tracker.notify_write(self.id);
        }
        true
    }

    /// Update the value using a function.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&*self.value.read());
        self.write(next)
    }

    /// Number of committed changes since creation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Get the number of computations currently reading this cell.
    pub fn subscriber_count(&self) -> usize {
        self.tracker.dependent_count(self.id)
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Exempt this cell from retention pruning.
    pub fn retain(&self) {
        self.flags.retained.store(true, Ordering::SeqCst);
    }

    pub fn is_retained(&self) -> bool {
        self.flags.retained.load(Ordering::SeqCst)
    }

    /// Release this cell's tracker registration if nothing reads it and it
    /// is not retained.
    pub fn release(&self) -> bool {
        !self.is_retained() && !self.is_detached() && self.tracker.release(self.id)
    }

    /// Permanently cut this cell loose from the tracker.
    ///
    /// Dependents stop depending on it and pending notifications are
    /// dropped. The value stays readable.
    pub fn detach(&self) {
        if !self.flags.detached.swap(true, Ordering::SeqCst) {
            self.tracker.detach(self.id);
        }
    }

    pub fn is_detached(&self) -> bool {
        self.flags.detached.load(Ordering::SeqCst)
    }

    fn track_with(&self, cx: &ReactiveContext) {
        if self.is_detached() {
            return;
        }
        if cx.tracker().same(&self.tracker) {
            cx.track(self.id);
        } else {
            tracing::warn!(cell = self.id.raw(), "read through a context of another tracker");
        }
    }

    fn track_ambient(&self) {
        if !self.is_detached() {
            self.tracker.track_ambient(self.id);
        }
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tracker: self.tracker.clone(),
            value: Arc::clone(&self.value),
            version: Arc::clone(&self.version),
            flags: Arc::clone(&self.flags),
            eq: self.eq,
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("version", &self.version())
            .finish()
    }
}
