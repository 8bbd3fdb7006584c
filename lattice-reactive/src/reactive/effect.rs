//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs synchronously, inside
//!    the `set` that caused the change.
//!
//! 3. Every run first drops the dependencies of the previous run, then runs
//!    the previous cleanup, then tracks whatever the body reads this time.
//!
//! # Cleanup
//!
//! The effect body may return a [`Cleanup`]. It is called before the next
//! run and when the effect is disposed. This is useful for cleaning up
//! resources like listeners or timers.
//!
//! # Failures
//!
//! A panic in the body or in a cleanup, or an `Err` returned by the body, is
//! reported through the runtime. It never reaches the code that triggered
//! the run, and the effect keeps its subscriptions.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Display};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::runtime::{Reactive, RunnerHandle, Runtime};
use crate::error::{Origin, ReportedError};
use crate::graph::{RunnerId, RunnerKind, SourceId};

/// A teardown callback returned by an effect or computed run.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect body may return.
pub trait EffectOutput {
    /// Split the output into an optional cleanup, or a failure message.
    fn into_cleanup(self) -> Result<Option<Cleanup>, String>;
}

impl EffectOutput for () {
    fn into_cleanup(self) -> Result<Option<Cleanup>, String> {
        Ok(None)
    }
}

impl EffectOutput for Cleanup {
    fn into_cleanup(self) -> Result<Option<Cleanup>, String> {
        Ok(Some(self))
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_cleanup(self) -> Result<Option<Cleanup>, String> {
        Ok(self)
    }
}

impl<T, E> EffectOutput for Result<T, E>
where
    T: EffectOutput,
    E: Display,
{
    fn into_cleanup(self) -> Result<Option<Cleanup>, String> {
        match self {
            Ok(output) => output.into_cleanup(),
            Err(e) => Err(e.to_string()),
        }
    }
}

type EffectBody = Box<dyn Fn() -> Result<Option<Cleanup>, String>>;

struct EffectInner {
    id: RunnerId,
    runtime: Runtime,
    body: EffectBody,
    cleanup: RefCell<Option<Cleanup>>,
    disposed: Cell<bool>,
    run_count: Cell<usize>,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.get() {
            return;
        }

        let cleared = self.runtime.begin_run(self.id);
        trace!(runner = ?self.id, cleared, "running effect");
        self.run_cleanup();

        let outcome = {
            let _ctx = ReactiveContext::enter(&self.runtime, self.id);
            catch_unwind(AssertUnwindSafe(|| (self.body)()))
        };
        self.run_count.set(self.run_count.get() + 1);

        match outcome {
            Ok(Ok(cleanup)) => self.store_cleanup(cleanup),
            Ok(Err(message)) => self
                .runtime
                .report(ReportedError::new(Origin::Effect, Some(self.id), message)),
            Err(payload) => self
                .runtime
                .report(ReportedError::from_panic(Origin::Effect, Some(self.id), payload)),
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
        // Disposed from inside its own body: nothing will call it later.
        if self.disposed.get() {
            self.runtime
                .guard(Origin::Cleanup, Some(self.id), || cleanup.run());
            return;
        }
        // A nested re-run already stored one; it must not be lost.
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
        debug!(runner = ?self.id, runs = self.run_count.get(), "disposing effect");
        let handle = self.runtime.release_runner(self.id);
        self.run_cleanup();
        drop(handle);
    }
}

impl Reactive for EffectInner {
    fn invalidate(&self) -> Option<SourceId> {
        None
    }

    fn schedule(&self) {
        self.execute();
    }

    fn is_eager(&self) -> bool {
        true
    }

    fn dispose(&self) {
        self.shutdown();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The runtime keeps the effect alive until [`dispose`](Effect::dispose) is
/// called; dropping every `Effect` handle does not stop it.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use lattice_reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_signal(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let effect = rt.create_effect({
///     let (count, seen) = (count.clone(), seen.clone());
///     move || seen.set(count.get())
/// });
/// assert_eq!(seen.get(), 0);
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
///
/// effect.dispose();
/// count.set(6);
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it once.
    pub fn new<F, R>(runtime: &Runtime, body: F) -> Self
    where
        F: Fn() -> R + 'static,
        R: EffectOutput,
    {
        let effect = Self::new_lazy(runtime, body);
        effect.inner.execute();
        effect
    }

    /// Create a new effect without running it.
    ///
    /// It has no dependencies until [`run`](Effect::run) is called.
    pub fn new_lazy<F, R>(runtime: &Runtime, body: F) -> Self
    where
        F: Fn() -> R + 'static,
        R: EffectOutput,
    {
        let id = runtime.add_runner(RunnerKind::Effect);
        let inner = Rc::new(EffectInner {
            id,
            runtime: runtime.clone(),
            body: Box::new(move || body().into_cleanup()),
            cleanup: RefCell::new(None),
            disposed: Cell::new(false),
            run_count: Cell::new(0),
        });
        let handle: Rc<dyn Reactive> = inner.clone();
        runtime.attach_runner(id, RunnerHandle::Owned(handle));
        Self { inner }
    }

    /// Get the effect's runner ID.
    pub fn id(&self) -> RunnerId {
        self.inner.id
    }

    /// Run the effect now, as if a dependency had changed.
    pub fn run(&self) {
        self.inner.execute();
    }

    /// Dispose of the effect.
    ///
    /// Removes it from every dependency, runs the last cleanup, and
    /// guarantees it never runs again. Calling this twice is harmless.
    pub fn dispose(&self) {
        self.inner.shutdown();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of sources read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.runtime.dependency_count(self.inner.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Runtime {
    /// Create an effect in this runtime and run it once. See [`Effect::new`].
    pub fn create_effect<F, R>(&self, body: F) -> Effect
    where
        F: Fn() -> R + 'static,
        R: EffectOutput,
    {
        Effect::new(self, body)
    }

    /// Create an effect without running it. See [`Effect::new_lazy`].
    pub fn create_effect_lazy<F, R>(&self, body: F) -> Effect
    where
        F: Fn() -> R + 'static,
        R: EffectOutput,
    {
        Effect::new_lazy(self, body)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
