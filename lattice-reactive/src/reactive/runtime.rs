//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! effects and reactive state. It owns the dependency graph, the stack of
//! running computations, and the queue of reported failures.
//!
//! # How It Works
//!
//! 1. When a source is created, it registers with the runtime.
//!
//! 2. When a computed or effect reads a source, the runtime records the
//!    edge for the runner on top of the stack.
//!
//! 3. When a source's value changes, the runtime:
//!    a. Marks dependent computeds dirty, transitively (they recompute on
//!       next access)
//!    b. Re-runs effects immediately, in subscription order
//!    c. Calls plain callbacks
//!
//! # Isolation
//!
//! There is no global state. Every `Runtime` is an independent graph, and a
//! `Runtime` value is a cheap handle to it. Everything here is
//! single-threaded: handles are `!Send` and all propagation happens on the
//! caller's stack.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::{debug, error, trace};

use super::subscriber::{Callback, Subscription};
use crate::config::RuntimeConfig;
use crate::error::{Origin, ReportedError};
use crate::graph::{CallbackId, DependencyGraph, RunnerId, RunnerKind, SourceId, Subscriber};

/// A runner the graph can notify.
pub(crate) trait Reactive {
    /// Mark this runner as needing to recompute (computeds only).
    ///
    /// Returns the runner's own source if it just went from clean to dirty,
    /// so its readers can be invalidated in turn.
    fn invalidate(&self) -> Option<SourceId>;

    /// Run this runner now (effects only).
    fn schedule(&self);

    /// Whether this runner re-runs on notification (effect) or is lazy
    /// (computed).
    fn is_eager(&self) -> bool;

    /// Remove the runner from the graph and run its final cleanup.
    fn dispose(&self);
}

/// How the graph holds on to a runner.
///
/// Effects are owned by the runtime until disposed. Computeds are owned by
/// their handles and disappear when the last one is dropped.
pub(crate) enum RunnerHandle {
    Owned(Rc<dyn Reactive>),
    Shared(Weak<dyn Reactive>),
}

impl RunnerHandle {
    fn upgrade(&self) -> Option<Rc<dyn Reactive>> {
        match self {
            RunnerHandle::Owned(reactive) => Some(Rc::clone(reactive)),
            RunnerHandle::Shared(reactive) => reactive.upgrade(),
        }
    }
}

type Graph = DependencyGraph<RunnerHandle, Callback>;

/// A release requested while the graph was borrowed.
#[derive(Debug, Clone, Copy)]
enum Release {
    Source(SourceId),
    Runner(RunnerId),
}

/// One entry of a notification snapshot.
enum Pending {
    Runner(RunnerId, Rc<dyn Reactive>),
    Callback(Callback),
}

struct RuntimeInner {
    config: RuntimeConfig,
    graph: RefCell<Graph>,
    stack: RefCell<Vec<Option<RunnerId>>>,
    errors: RefCell<VecDeque<ReportedError>>,
    deferred: RefCell<Vec<Release>>,
}

/// Handle to a reactive graph.
///
/// Cloning the handle shares the graph.
///
/// ```rust
/// use lattice_reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_signal(1);
/// let doubled = rt.create_computed({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 2);
/// count.set(21);
/// assert_eq!(doubled.get(), 42);
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(?config, "creating reactive runtime");
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                graph: RefCell::new(Graph::new()),
                stack: RefCell::new(Vec::new()),
                errors: RefCell::new(VecDeque::new()),
                deferred: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether two handles point at the same graph.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Runner stack
    // ------------------------------------------------------------------

    /// The runner reads are currently attributed to, if any.
    pub fn current_runner(&self) -> Option<RunnerId> {
        self.inner.stack.borrow().last().copied().flatten()
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking(&self) -> bool {
        self.current_runner().is_some()
    }

    /// Run `f` without tracking any reads it performs.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _ctx = super::ReactiveContext::untracked(self);
        f()
    }

    pub(crate) fn push_frame(&self, runner: Option<RunnerId>) -> usize {
        let mut stack = self.inner.stack.borrow_mut();
        stack.push(runner);
        stack.len()
    }

    pub(crate) fn pop_frame(&self) -> Option<Option<RunnerId>> {
        self.inner.stack.borrow_mut().pop()
    }

    // ------------------------------------------------------------------
    // Graph bookkeeping
    // ------------------------------------------------------------------

    pub(crate) fn add_source(&self) -> SourceId {
        self.flush_deferred();
        self.inner.graph.borrow_mut().add_source()
    }

    pub(crate) fn add_runner(&self, kind: RunnerKind) -> RunnerId {
        self.flush_deferred();
        self.inner.graph.borrow_mut().add_runner(kind)
    }

    pub(crate) fn attach_runner(&self, id: RunnerId, handle: RunnerHandle) -> bool {
        self.inner.graph.borrow_mut().attach(id, handle)
    }

    /// Record a read of `source` for the current runner.
    pub(crate) fn track(&self, source: SourceId) {
        if let Some(runner) = self.current_runner() {
            self.inner.graph.borrow_mut().track(runner, source);
        }
    }

    /// Clear every edge of `runner` ahead of a new run.
    pub(crate) fn begin_run(&self, runner: RunnerId) -> usize {
        self.inner.graph.borrow_mut().begin_run(runner)
    }

    pub(crate) fn dependency_count(&self, runner: RunnerId) -> usize {
        self.inner
            .graph
            .borrow()
            .runner(runner)
            .map_or(0, |node| node.dependencies().len())
    }

    pub(crate) fn subscriber_count(&self, source: SourceId) -> usize {
        self.inner.graph.borrow().subscribers(source).count()
    }

    /// Remove a source and everything attached to it.
    ///
    /// Safe to call from `Drop`: if the graph is busy, the release is
    /// deferred to the next graph update.
    pub(crate) fn release_source(&self, id: SourceId) {
        let removed = match self.inner.graph.try_borrow_mut() {
            Ok(mut graph) => graph.remove_source(id),
            Err(_) => {
                self.defer(Release::Source(id));
                return;
            }
        };
        if let Some(removed) = removed {
            trace!(
                source = ?id,
                subscribers = removed.node.subscribers().len(),
                "released source"
            );
            // Callbacks may own other handles; drop them with the graph free.
            drop(removed);
        }
    }

    /// Remove a runner from the graph, returning its handle.
    pub(crate) fn release_runner(&self, id: RunnerId) -> Option<RunnerHandle> {
        match self.inner.graph.try_borrow_mut() {
            Ok(mut graph) => graph.remove_runner(id),
            Err(_) => {
                self.defer(Release::Runner(id));
                None
            }
        }
    }

    pub(crate) fn add_callback(&self, source: SourceId, callback: Callback) -> Subscription {
        let id = self.inner.graph.borrow_mut().add_callback(source, callback);
        match id {
            Some(id) => {
                let runtime = self.clone();
                Subscription::new(move || runtime.remove_callback(id))
            }
            None => Subscription::inert(),
        }
    }

    fn remove_callback(&self, id: CallbackId) {
        let removed = self.inner.graph.borrow_mut().remove_callback(id);
        drop(removed);
    }

    fn defer(&self, release: Release) {
        trace!(?release, "graph busy, deferring release");
        self.inner.deferred.borrow_mut().push(release);
    }

    fn flush_deferred(&self) {
        loop {
            if self.inner.graph.try_borrow_mut().is_err() {
                return;
            }
            let pending = std::mem::take(&mut *self.inner.deferred.borrow_mut());
            if pending.is_empty() {
                return;
            }
            for release in pending {
                match release {
                    Release::Source(id) => self.release_source(id),
                    Release::Runner(id) => drop(self.release_runner(id)),
                }
            }
        }
    }

    /// Number of live sources in the graph.
    pub fn source_count(&self) -> usize {
        self.inner.graph.borrow().source_count()
    }

    /// Number of live runners in the graph.
    pub fn runner_count(&self) -> usize {
        self.inner.graph.borrow().runner_count()
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Notify every subscriber of `source` that it changed.
    ///
    /// Propagation runs in two passes. The first walks the graph, marking
    /// computeds dirty and following their own subscribers, and collects the
    /// effects and callbacks to run. No user code runs during the walk. The
    /// second pass runs what was collected, each effect at most once.
    ///
    /// Subscriber sets are snapshotted during the walk, so subscriptions
    /// added or removed while the second pass runs do not affect it.
    pub(crate) fn notify(&self, source: SourceId) {
        self.flush_deferred();

        let mut sources: SmallVec<[SourceId; 4]> = SmallVec::new();
        sources.push(source);
        let mut pending: SmallVec<[Pending; 8]> = SmallVec::new();
        let mut queued: IndexSet<RunnerId> = IndexSet::new();

        let mut next = 0;
        while let Some(&current) = sources.get(next) {
            next += 1;
            for entry in self.snapshot(current) {
                match entry {
                    Pending::Runner(id, reactive) if reactive.is_eager() => {
                        if queued.insert(id) {
                            pending.push(Pending::Runner(id, reactive));
                        }
                    }
                    Pending::Runner(_, reactive) => {
                        if let Some(derived) = reactive.invalidate() {
                            sources.push(derived);
                        }
                    }
                    callback @ Pending::Callback(_) => pending.push(callback),
                }
            }
        }

        if pending.is_empty() {
            return;
        }
        trace!(
            ?source,
            invalidated = sources.len() - 1,
            subscribers = pending.len(),
            "notifying subscribers"
        );

        for entry in pending {
            match entry {
                Pending::Runner(_, reactive) => reactive.schedule(),
                Pending::Callback(callback) => {
                    // Callbacks are not runners; their reads must not attach
                    // to whichever runner triggered this change.
                    self.guard(Origin::Subscriber, None, || self.untrack(|| callback()));
                }
            }
        }
    }

    /// Live subscribers of `source`, in subscription order.
    fn snapshot(&self, source: SourceId) -> SmallVec<[Pending; 8]> {
        let graph = self.inner.graph.borrow();
        graph
            .subscribers(source)
            .filter_map(|subscriber| match subscriber {
                Subscriber::Runner(id) => graph
                    .runner(id)
                    .and_then(|node| node.handle())
                    .and_then(RunnerHandle::upgrade)
                    .map(|reactive| Pending::Runner(id, reactive)),
                Subscriber::Callback(id) => graph.callback(id).cloned().map(Pending::Callback),
            })
            .collect()
    }

    /// Dispose every runner in the graph.
    ///
    /// Effects hold their closures, which often hold signals, which hold the
    /// runtime. Disposing breaks those cycles.
    pub fn dispose(&self) {
        let handles: Vec<Rc<dyn Reactive>> = {
            let graph = self.inner.graph.borrow();
            graph
                .runner_ids()
                .into_iter()
                .filter_map(|id| graph.runner(id).and_then(|node| node.handle()))
                .filter_map(RunnerHandle::upgrade)
                .collect()
        };
        debug!(runners = handles.len(), "disposing runtime");
        for handle in handles {
            handle.dispose();
        }
    }

    // ------------------------------------------------------------------
    // Error reporting
    // ------------------------------------------------------------------

    /// Run user code, catching and reporting a panic.
    pub(crate) fn guard<R>(
        &self,
        origin: Origin,
        runner: Option<RunnerId>,
        f: impl FnOnce() -> R,
    ) -> Option<R> {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                self.report(ReportedError::from_panic(origin, runner, payload));
                None
            }
        }
    }

    /// Log a failure and queue it for [`take_errors`](Self::take_errors).
    pub(crate) fn report(&self, report: ReportedError) {
        if self.inner.config.log_reports {
            error!(
                origin = %report.origin,
                runner = ?report.runner,
                message = %report.message,
                "reactive computation failed"
            );
        }

        let capacity = self.inner.config.retained_errors;
        if capacity == 0 {
            return;
        }
        let mut errors = self.inner.errors.borrow_mut();
        errors.push_back(report);
        while errors.len() > capacity {
            errors.pop_front();
        }
    }

    /// Drain every failure reported since the last call, oldest first.
    pub fn take_errors(&self) -> Vec<ReportedError> {
        self.inner.errors.borrow_mut().drain(..).collect()
    }

    /// Number of reported failures waiting in the queue.
    pub fn pending_errors(&self) -> usize {
        self.inner.errors.borrow().len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.inner.graph.try_borrow();
        f.debug_struct("Runtime")
            .field("sources", &graph.as_ref().map(|g| g.source_count()).ok())
            .field("runners", &graph.as_ref().map(|g| g.runner_count()).ok())
            .field("depth", &self.inner.stack.borrow().len())
            .field("pending_errors", &self.pending_errors())
            .finish()
    }
}
