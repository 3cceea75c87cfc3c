//! Dependency Tracker
//!
//! The tracker is the central coordinator that connects cells, memos, and
//! observers. It manages the dependency graph and schedules updates when
//! cells change.
//!
//! # How It Works
//!
//! 1. When a memo or observer evaluates, it runs inside a
//!    [`ReactiveContext`]; every cell read in that context is recorded and
//!    becomes a dependency edge once the evaluation finishes.
//!
//! 2. When a cell's value changes, the tracker:
//!    a. Marks direct dependents dirty and everything downstream maybe dirty
//!    b. Adds all of them to the pending set of the current batch
//!    c. Flushes when the outermost batch closes
//!
//! 3. A flush orders the pending set topologically and evaluates each dirty
//!    node exactly once, producers before consumers. A memo whose output did
//!    not change leaves its dependents untouched, so they are skipped.
//!
//! A write outside any batch is a batch of one and flushes immediately.
//! Writes made by observers during a flush start another round.
//!
//! # Ownership
//!
//! Every [`Store`](crate::Store) owns one tracker; nothing here is global.
//! The tracker only holds weak references to memos and observers, so
//! dropping the last handle to one of them unregisters it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::{trace, warn};

use super::context::{Frame, ReactiveContext, Reads};
use crate::error::{Result, StoreError};
use crate::graph::{DirtyState, NodeKind, ReactiveId, UpdateScheduler};

/// Default bound on propagation rounds per flush.
pub const DEFAULT_MAX_ROUNDS: usize = 100;

/// A computation the tracker can re-run when its inputs change.
pub trait Reactive: Send + Sync {
    /// The node this computation occupies in the dependency graph.
    fn reactive_id(&self) -> ReactiveId;

    /// Re-run the computation.
    ///
    /// Returns whether its output changed. Observers always report `true`;
    /// memos compare against their cached value.
    fn evaluate(&self) -> bool;
}

struct TrackerState {
    graph: UpdateScheduler,
    reactives: HashMap<ReactiveId, Weak<dyn Reactive>>,
    /// One activation stack per thread currently evaluating.
    stacks: HashMap<ThreadId, Vec<Frame>>,
    pending: IndexSet<ReactiveId>,
    batch_depth: usize,
    flushing: bool,
    max_rounds: usize,
}

/// Handle to a dependency tracker. Clones share the same state.
#[derive(Clone)]
pub struct Tracker {
    state: Arc<Mutex<TrackerState>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::with_max_rounds(DEFAULT_MAX_ROUNDS)
    }

    /// Create a tracker whose flushes give up after `max_rounds` rounds.
    pub fn with_max_rounds(max_rounds: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                graph: UpdateScheduler::new(),
                reactives: HashMap::new(),
                stacks: HashMap::new(),
                pending: IndexSet::new(),
                batch_depth: 0,
                flushing: false,
                max_rounds: max_rounds.max(1),
            })),
        }
    }

    /// Whether two handles refer to the same tracker.
    pub fn same(&self, other: &Tracker) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a memo or observer.
    pub(crate) fn register(&self, kind: NodeKind, reactive: Weak<dyn Reactive>, id: ReactiveId) {
        let mut state = self.state.lock();
        state.graph.ensure_node(id, kind);
        state.reactives.insert(id, reactive);
    }

    /// Remove a memo or observer: its edges, its registration, and any
    /// pending re-evaluation. Safe to call mid-flush.
    pub(crate) fn dispose(&self, id: ReactiveId) {
        let mut state = self.state.lock();
        state.graph.remove_node(id);
        state.reactives.remove(&id);
        state.pending.shift_remove(&id);
        trace!(id = id.raw(), "disposed reactive");
    }

    /// Remove a cell from the graph. Its dependents stop depending on it.
    pub(crate) fn detach(&self, id: ReactiveId) {
        let mut state = self.state.lock();
        state.graph.remove_node(id);
        state.pending.shift_remove(&id);
    }

    /// Drop a cell's graph node if nothing reads it.
    ///
    /// Returns whether a node was released. The node comes back on the
    /// next tracked read.
    pub(crate) fn release(&self, id: ReactiveId) -> bool {
        let mut state = self.state.lock();
        match state.graph.get_node(id) {
            Some(node) if node.kind() == NodeKind::Source && node.dependents().is_empty() => {
                state.graph.remove_node(id);
                true
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Activation stack
    // ------------------------------------------------------------------

    pub(crate) fn push_frame(&self, frame: Frame) {
        self.state
            .lock()
            .stacks
            .entry(thread::current().id())
            .or_default()
            .push(frame);
    }

    /// Pop the frame belonging to `observer`.
    ///
    /// Frames are strictly nested per thread, so the expected frame is on
    /// top of the calling thread's stack.
    pub(crate) fn pop_frame(&self, observer: Option<ReactiveId>) -> Option<Frame> {
        let thread = thread::current().id();
        let mut state = self.state.lock();
        let stack = state.stacks.get_mut(&thread)?;
        let popped = stack.pop();
        if stack.is_empty() {
            state.stacks.remove(&thread);
        }
        if let Some(frame) = &popped {
            debug_assert_eq!(
                frame.observer, observer,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                observer, frame.observer
            );
        }
        popped
    }

    /// Get the computation currently being tracked, if any.
    pub fn current(&self) -> Option<ReactiveId> {
        self.state
            .lock()
            .stacks
            .get(&thread::current().id())
            .and_then(|stack| stack.last())
            .and_then(|frame| frame.observer)
    }

    /// Check if we're inside a tracked reactive context.
    pub fn is_tracking(&self) -> bool {
        self.current().is_some()
    }

    /// Record that `observer` read `source` during its current evaluation.
    pub(crate) fn record(&self, observer: ReactiveId, source: ReactiveId) {
        let mut state = self.state.lock();
        let frame = state.stacks.get_mut(&thread::current().id()).and_then(|stack| {
            stack
                .iter_mut()
                .rev()
                .find(|frame| frame.observer == Some(observer))
        });
        if let Some(frame) = frame {
            frame.record(source);
        }
    }

    /// Record a read of `source` for whatever computation is on top of the
    /// activation stack.
    pub(crate) fn track_ambient(&self, source: ReactiveId) {
        let mut state = self.state.lock();
        let top = state
            .stacks
            .get_mut(&thread::current().id())
            .and_then(|stack| stack.last_mut());
        if let Some(frame) = top {
            if frame.observer.is_some() {
                frame.record(source);
            }
        }
    }

    /// Run `f` with dependency tracking suspended.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Resume<'a>(&'a Tracker);
        impl Drop for Resume<'_> {
            fn drop(&mut self) {
                self.0.pop_frame(None);
            }
        }

        self.push_frame(Frame::untracked());
        let _resume = Resume(self);
        f()
    }

    /// Evaluate `id` inside a fresh context and commit the reads it made as
    /// its new dependency set.
    ///
    /// The evaluation is a batch of its own: writes it makes propagate once
    /// its dependencies are committed, never halfway through.
    pub(crate) fn run<R>(&self, id: ReactiveId, f: impl FnOnce(&ReactiveContext) -> R) -> R {
        let _batch = self.begin_batch();
        let cx = ReactiveContext::enter(self, id);
        let result = f(&cx);
        let reads: Reads = cx.finish();

        let mut state = self.state.lock();
        if state.graph.contains(id) {
            state.graph.replace_dependencies(id, reads);
            state.graph.mark_clean(id);
        }
        result
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Notify the tracker that `source` changed.
    ///
    /// Dependents are queued in the current batch; outside a batch this
    /// flushes right away.
    pub(crate) fn notify_write(&self, source: ReactiveId) {
        let should_flush = {
            let mut state = self.state.lock();
            let affected = state.graph.mark_changed(source);
            if affected.is_empty() {
                return;
            }
            state.pending.extend(affected);
            state.batch_depth == 0 && !state.flushing
        };

        if should_flush {
            if let Err(err) = self.flush() {
                warn!(%err, "propagation aborted");
            }
        }
    }

    /// Open a batch. Writes made while the guard lives are propagated once,
    /// when the outermost guard is dropped or committed.
    pub fn begin_batch(&self) -> BatchGuard {
        self.state.lock().batch_depth += 1;
        BatchGuard {
            tracker: self.clone(),
            open: true,
        }
    }

    /// Run `f` as a single batch.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _batch = self.begin_batch();
        f()
    }

    /// Whether a batch is currently open.
    pub fn is_batching(&self) -> bool {
        self.state.lock().batch_depth > 0
    }

    /// Number of nodes waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Re-evaluate everything affected by writes since the last flush.
    ///
    /// Does nothing inside an open batch or when a flush is already running
    /// further up the stack; that flush will pick the work up.
    pub fn flush(&self) -> Result<()> {
        let max_rounds = {
            let mut state = self.state.lock();
            if state.flushing || state.batch_depth > 0 || state.pending.is_empty() {
                return Ok(());
            }
            state.flushing = true;
            state.max_rounds
        };

        struct EndFlush<'a>(&'a Tracker);
        impl Drop for EndFlush<'_> {
            fn drop(&mut self) {
                self.0.state.lock().flushing = false;
            }
        }
        let _end = EndFlush(self);

        let mut rounds = 0;
        loop {
            let order = {
                let mut state = self.state.lock();
                if state.pending.is_empty() {
                    break;
                }
                rounds += 1;
                if rounds > max_rounds {
                    let abandoned: Vec<ReactiveId> = state.pending.drain(..).collect();
                    for id in abandoned {
                        state.graph.mark_clean(id);
                    }
                    warn!(rounds = max_rounds, "flush exceeded its round limit");
                    return Err(StoreError::PropagationLimit { rounds: max_rounds });
                }
                let pending: Vec<ReactiveId> = state.pending.drain(..).collect();
                state.graph.topological_sort(&pending)
            };

            trace!(round = rounds, nodes = order.len(), "flushing");
            let in_round: HashSet<ReactiveId> = order.iter().copied().collect();
            for id in order {
                self.process(id, &in_round);
            }
        }

        Ok(())
    }

    /// Evaluate one node of a flush round if it is dirty.
    fn process(&self, id: ReactiveId, in_round: &HashSet<ReactiveId>) {
        let reactive = {
            let mut state = self.state.lock();
            match state.graph.dirty_state(id) {
                None | Some(DirtyState::Clean) => return,
                Some(DirtyState::MaybeDirty) => {
                    // No direct input changed
                    state.graph.mark_clean(id);
                    return;
                }
                Some(DirtyState::Dirty) => {}
            }
            match state.reactives.get(&id).and_then(Weak::upgrade) {
                Some(reactive) => reactive,
                None => {
                    // A cell, or a computation whose handles are all gone
                    state.graph.mark_clean(id);
                    return;
                }
            }
        };

        let changed = reactive.evaluate();

        // A computation is never re-triggered by its own writes
        let mut state = self.state.lock();
        state.graph.mark_clean(id);
        if changed {
            for dependent in state.graph.mark_dependents_dirty(id) {
                if !in_round.contains(&dependent) {
                    state.pending.insert(dependent);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub(crate) fn dirty_state(&self, id: ReactiveId) -> Option<DirtyState> {
        self.state.lock().graph.dirty_state(id)
    }

    /// Number of computations that currently read `id`.
    pub fn dependent_count(&self, id: ReactiveId) -> usize {
        self.state.lock().graph.dependent_count(id)
    }

    /// Number of nodes `id` currently reads.
    pub fn dependency_count(&self, id: ReactiveId) -> usize {
        self.state
            .lock()
            .graph
            .get_node(id)
            .map_or(0, |node| node.dependencies().len())
    }

    /// Whether any computation currently reads `id`.
    pub fn has_dependents(&self, id: ReactiveId) -> bool {
        self.dependent_count(id) > 0
    }

    /// Number of nodes in the dependency graph.
    pub fn node_count(&self) -> usize {
        self.state.lock().graph.node_count()
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Tracker")
            .field("nodes", &state.graph.node_count())
            .field("pending", &state.pending.len())
            .field("batch_depth", &state.batch_depth)
            .field("flushing", &state.flushing)
            .finish()
    }
}

/// An open batch. Dropping the outermost guard flushes.
#[must_use = "dropping the guard immediately closes the batch"]
pub struct BatchGuard {
    tracker: Tracker,
    open: bool,
}

impl BatchGuard {
    /// Close the batch and report whether propagation settled.
    pub fn commit(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let outermost = {
            let mut state = self.tracker.state.lock();
            state.batch_depth = state.batch_depth.saturating_sub(1);
            state.batch_depth == 0
        };
        if outermost {
            self.tracker.flush()
        } else {
            Ok(())
        }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(%err, "propagation aborted at end of batch");
        }
    }
}
