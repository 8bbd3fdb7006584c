//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. The computed starts dirty. On first access it runs its function and
//!    caches the result.
//!
//! 2. When accessed again while clean, the cached value is returned and the
//!    function is not called.
//!
//! 3. When a dependency changes, the computed is marked dirty. It does not
//!    recompute yet.
//!
//! 4. On next access, it recomputes exactly once.
//!
//! A computed is also a source: whoever reads it subscribes to it, and it
//! notifies those readers when it turns dirty. An effect that reads a
//! computed therefore re-runs when the computed's inputs change, and pulls
//! the fresh value during that run. Invalidation reaches every computed
//! before any effect runs, so an effect never sees a stale computed.
//!
//! # Cleanup
//!
//! The value returned by [`Computed::new`] is always treated as the value.
//! A computed that needs teardown between recomputes uses
//! [`Computed::with_cleanup`] instead, which returns the value and a
//! [`Cleanup`] as a pair.
//!
//! # Failures
//!
//! A panicking computation is reported through the runtime and leaves the
//! computed dirty, so the next read tries again. Readers keep receiving
//! invalidations while it fails. Inside effects, prefer
//! [`Computed::try_get`]: it yields the last good value, or an error if
//! there never was one, where [`Computed::get`] would panic in the reader.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::effect::Cleanup;
use super::runtime::{Reactive, RunnerHandle, Runtime};
use crate::error::{Origin, ReactiveError, ReportedError};
use crate::graph::{RunnerId, RunnerKind, SourceId};

/// Dirty state for a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed (or nothing was computed yet).
    Dirty,
}

type ComputeFn<T> = Box<dyn Fn() -> (T, Option<Cleanup>)>;

struct ComputedInner<T> {
    id: RunnerId,
    source: SourceId,
    runtime: Runtime,
    compute: ComputeFn<T>,
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    /// Readers were told about the current invalidation and nobody has read
    /// since. Separate from `dirty`, which a failed recompute leaves set.
    notified: Cell<bool>,
    cleanup: RefCell<Option<Cleanup>>,
    disposed: Cell<bool>,
}

impl<T: Clone + 'static> ComputedInner<T> {
    /// Recompute the value, tracking dependencies.
    ///
    /// On failure the computed stays dirty and the message is returned.
    fn recompute(&self) -> Result<(), String> {
        let cleared = self.runtime.begin_run(self.id);
        trace!(runner = ?self.id, cleared, "recomputing");
        self.run_cleanup();

        let outcome = {
            let _ctx = ReactiveContext::enter(&self.runtime, self.id);
            catch_unwind(AssertUnwindSafe(|| (self.compute)()))
        };

        match outcome {
            Ok((value, cleanup)) => {
                *self.value.borrow_mut() = Some(value);
                self.dirty.set(false);
                self.store_cleanup(cleanup);
                Ok(())
            }
            Err(payload) => {
                let report = ReportedError::from_panic(Origin::Computed, Some(self.id), payload);
                let message = report.message.clone();
                self.runtime.report(report);
                Err(message)
            }
        }
    }

    fn try_get(&self, track: bool) -> Result<T, ReactiveError> {
        self.notified.set(false);
        if track {
            self.runtime.track(self.source);
        }

        let failure = if self.dirty.get() {
            self.recompute().err()
        } else {
            None
        };

        let value = self.value.borrow();
        match (value.as_ref(), failure) {
            (Some(value), _) => Ok(value.clone()),
            (None, message) => Err(ReactiveError::ComputationFailed {
                runner: self.id,
                message: message.unwrap_or_else(|| "no value computed".to_string()),
            }),
        }
    }

    fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            self.runtime
                .guard(Origin::Cleanup, Some(self.id), || cleanup.run());
        }
    }

    fn store_cleanup(&self, cleanup: Option<Cleanup>) {
        let Some(cleanup) = cleanup else {
            return;
        };
        if self.disposed.get() {
            self.runtime
                .guard(Origin::Cleanup, Some(self.id), || cleanup.run());
            return;
        }
        let displaced = self.cleanup.borrow_mut().replace(cleanup);
        if let Some(displaced) = displaced {
            self.runtime
                .guard(Origin::Cleanup, Some(self.id), || displaced.run());
        }
    }

    fn shutdown(&self) {
        if self.disposed.replace(true) {
            return;
        }
        debug!(runner = ?self.id, "disposing computed");
        let handle = self.runtime.release_runner(self.id);
        self.runtime.release_source(self.source);
        self.run_cleanup();
        drop(handle);
    }
}

impl<T: Clone + 'static> Reactive for ComputedInner<T> {
    fn invalidate(&self) -> Option<SourceId> {
        if self.disposed.get() {
            return None;
        }
        self.dirty.set(true);
        if self.notified.replace(true) {
            return None;
        }
        trace!(runner = ?self.id, "computed invalidated");
        Some(self.source)
    }

    fn schedule(&self) {}

    fn is_eager(&self) -> bool {
        false
    }

    fn dispose(&self) {
        self.shutdown();
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        if self.disposed.replace(true) {
            return;
        }
        drop(self.runtime.release_runner(self.id));
        self.runtime.release_source(self.source);
        if let Some(cleanup) = self.cleanup.get_mut().take() {
            self.runtime
                .guard(Origin::Cleanup, Some(self.id), || cleanup.run());
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Cloning a computed yields another handle to the same cache. When the last
/// handle is dropped the computed leaves the graph.
///
/// # Example
///
/// ```rust
/// use lattice_reactive::Runtime;
///
/// let rt = Runtime::new();
/// let n = rt.create_signal(2);
/// let doubled = rt.create_computed({
///     let n = n.clone();
///     move || n.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// n.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a new computed with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(runtime, Box::new(move || (compute(), None)))
    }

    /// Create a computed whose function also returns a cleanup.
    ///
    /// The cleanup runs before the next recompute and on disposal.
    pub fn with_cleanup<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> (T, Cleanup) + 'static,
    {
        Self::build(
            runtime,
            Box::new(move || {
                let (value, cleanup) = compute();
                (value, Some(cleanup))
            }),
        )
    }

    fn build(runtime: &Runtime, compute: ComputeFn<T>) -> Self {
        let id = runtime.add_runner(RunnerKind::Computed);
        let inner = Rc::new(ComputedInner {
            id,
            source: runtime.add_source(),
            runtime: runtime.clone(),
            compute,
            value: RefCell::new(None),
            dirty: Cell::new(true),
            notified: Cell::new(false),
            cleanup: RefCell::new(None),
            disposed: Cell::new(false),
        });
        let weak: Weak<ComputedInner<T>> = Rc::downgrade(&inner);
        let weak: Weak<dyn Reactive> = weak;
        runtime.attach_runner(id, RunnerHandle::Shared(weak));
        Self { inner }
    }

    /// Get the runner ID used for dependency tracking.
    pub fn id(&self) -> RunnerId {
        self.inner.id
    }

    /// Get the source ID readers subscribe to.
    pub fn source_id(&self) -> SourceId {
        self.inner.source
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the computation has failed and no earlier value is cached.
    /// That panic lands in the reader, so code reading a computed that may
    /// fail should use [`try_get`](Self::try_get) instead.
    pub fn get(&self) -> T {
        match self.inner.try_get(true) {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// If the recompute fails, the failure is reported and the previous
    /// value is returned. Only when there is no previous value is the
    /// failure returned as an error.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        self.inner.try_get(true)
    }

    /// Like [`try_get`](Self::try_get), without subscribing the caller.
    pub fn get_untracked(&self) -> Result<T, ReactiveError> {
        self.inner.try_get(false)
    }

    /// Mark the computed as needing recomputation.
    ///
    /// Readers of the computed are notified if it was clean.
    pub fn mark_dirty(&self) {
        if let Some(source) = self.inner.invalidate() {
            self.inner.runtime.notify(source);
        }
    }

    /// Get the current dirty state.
    pub fn state(&self) -> ComputedState {
        if self.inner.dirty.get() {
            ComputedState::Dirty
        } else {
            ComputedState::Clean
        }
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Get the number of sources read during the last recompute.
    pub fn dependency_count(&self) -> usize {
        self.inner.runtime.dependency_count(self.inner.id)
    }

    /// Get the number of runners and callbacks reading this computed.
    pub fn subscriber_count(&self) -> usize {
        self.inner.runtime.subscriber_count(self.inner.source)
    }

    /// Detach the computed from the graph.
    ///
    /// The cached value stays readable but is never invalidated again.
    pub fn dispose(&self) {
        self.inner.shutdown();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl Runtime {
    /// Create a computed in this runtime. See [`Computed::new`].
    pub fn create_computed<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        Computed::new(self, compute)
    }

    /// Create a computed with a cleanup. See [`Computed::with_cleanup`].
    pub fn create_computed_with_cleanup<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> (T, Cleanup) + 'static,
    {
        Computed::with_cleanup(self, compute)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
