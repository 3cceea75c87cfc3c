//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a cell is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each [`Tracker`] keeps one activation stack per thread. When entering a
//! reactive context (e.g., running a memo or observer), we push a frame onto
//! the calling thread's stack. When the computation completes, we pop it and
//! hand the collected reads to the dependency graph.
//!
//! This design supports nested reactive contexts (e.g., a memo that reads
//! from another memo), keeps independent stores from seeing each other's
//! evaluations, and lets two threads evaluate against one tracker without
//! mixing their reads. A context never leaves the thread that entered it.
//!
//! The context is also the explicit handle passed to computations, so a read
//! can name its observer directly (`cell.read(Some(cx))`) instead of relying
//! on whatever happens to be on top of the stack.

use std::marker::PhantomData;

use smallvec::SmallVec;

use super::tracker::Tracker;
use crate::graph::ReactiveId;

/// Reads collected by one frame. Most computations touch a handful of cells.
pub(crate) type Reads = SmallVec<[ReactiveId; 8]>;

/// An entry in the activation stack.
///
/// `observer` is `None` for untracked sections, which hide the enclosing
/// computation from ambient reads.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) observer: Option<ReactiveId>,
    pub(crate) reads: Reads,
}

impl Frame {
    pub(crate) fn tracked(observer: ReactiveId) -> Self {
        Self {
            observer: Some(observer),
            reads: Reads::new(),
        }
    }

    pub(crate) fn untracked() -> Self {
        Self {
            observer: None,
            reads: Reads::new(),
        }
    }

    pub(crate) fn record(&mut self, source: ReactiveId) {
        if !self.reads.contains(&source) {
            self.reads.push(source);
        }
    }
}

/// Guard that pops the context when dropped.
///
/// This ensures the activation stack is properly maintained even if the
/// computation panics.
pub struct ReactiveContext {
    tracker: Tracker,
    observer: ReactiveId,
    active: bool,
    /// Frames live on the entering thread's stack.
    _thread_bound: PhantomData<*const ()>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given observer.
    ///
    /// While this context is active, any cells that are read will register
    /// the observer as a dependent once the context finishes.
    pub(crate) fn enter(tracker: &Tracker, observer: ReactiveId) -> Self {
        tracker.push_frame(Frame::tracked(observer));
        Self {
            tracker: tracker.clone(),
            observer,
            active: true,
            _thread_bound: PhantomData,
        }
    }

    /// The memo or observer this context evaluates.
    pub fn observer(&self) -> ReactiveId {
        self.observer
    }

    /// The tracker this context belongs to.
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Record a read of `source` on behalf of this context's observer.
    pub(crate) fn track(&self, source: ReactiveId) {
        self.tracker.record(self.observer, source);
    }

    /// Pop this context and return the reads it collected.
    pub(crate) fn finish(mut self) -> Reads {
        self.active = false;
        self.tracker
            .pop_frame(Some(self.observer))
            .map(|frame| frame.reads)
            .unwrap_or_default()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if self.active {
            self.tracker.pop_frame(Some(self.observer));
        }
    }
}

impl std::fmt::Debug for ReactiveContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveContext")
            .field("observer", &self.observer)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_observer() {
        let tracker = Tracker::new();
        let id = ReactiveId::new();

        assert!(!tracker.is_tracking());
        assert!(tracker.current().is_none());

        {
            let cx = ReactiveContext::enter(&tracker, id);
            assert!(tracker.is_tracking());
            assert_eq!(tracker.current(), Some(id));
            assert_eq!(cx.observer(), id);
        }

        // Context should be cleaned up after drop
        assert!(!tracker.is_tracking());
        assert!(tracker.current().is_none());
    }

    #[test]
    fn context_collects_reads_once() {
        let tracker = Tracker::new();
        let cx = ReactiveContext::enter(&tracker, ReactiveId::new());
        let a = ReactiveId::new();
        let b = ReactiveId::new();

        cx.track(a);
        cx.track(b);
        cx.track(a);

        let reads = cx.finish();
        assert_eq!(reads.as_slice(), &[a, b]);
        assert!(!tracker.is_tracking());
    }

    #[test]
    fn nested_contexts() {
        let tracker = Tracker::new();
        let id1 = ReactiveId::new();
        let id2 = ReactiveId::new();

        {
            let _cx1 = ReactiveContext::enter(&tracker, id1);
            assert_eq!(tracker.current(), Some(id1));

            {
                let _cx2 = ReactiveContext::enter(&tracker, id2);
                assert_eq!(tracker.current(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(tracker.current(), Some(id1));
        }

        assert!(tracker.current().is_none());
    }

    #[test]
    fn explicit_handle_targets_its_own_frame() {
        let tracker = Tracker::new();
        let outer = ReactiveContext::enter(&tracker, ReactiveId::new());
        let inner = ReactiveContext::enter(&tracker, ReactiveId::new());
        let source = ReactiveId::new();

        // Reading through the outer handle while the inner one is on top
        outer.track(source);

        assert!(inner.finish().is_empty());
        assert_eq!(outer.finish().as_slice(), &[source]);
    }

    #[test]
    fn untracked_hides_enclosing_context() {
        let tracker = Tracker::new();
        let id = ReactiveId::new();
        let _cx = ReactiveContext::enter(&tracker, id);

        tracker.untracked(|| {
            assert!(tracker.current().is_none());
        });
        assert_eq!(tracker.current(), Some(id));
    }
}
