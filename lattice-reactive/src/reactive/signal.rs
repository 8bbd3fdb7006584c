//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal's value changes, all subscribers are notified in the
//!    order they subscribed.
//!
//! 3. Setting a value equal to the current one is a no-op: nothing is
//!    notified. This is the only thing that stops an effect which writes a
//!    signal it reads from re-running forever.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::runtime::Runtime;
use super::subscriber::Subscription;
use crate::graph::SourceId;

struct SignalInner<T> {
    source: SourceId,
    runtime: Runtime,
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        self.runtime.release_source(self.source);
    }
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal yields another handle to the same cell. The cell is
/// released from the graph when the last handle is dropped.
///
/// # Example
///
/// ```rust
/// use lattice_reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_signal(0);
///
/// assert_eq!(count.get(), 0);
/// assert_eq!(count.set(5), 5);
/// assert_eq!(count.update(|n| n + 1), 6);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                source: runtime.add_source(),
                runtime: runtime.clone(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the signal's source ID.
    pub fn id(&self) -> SourceId {
        self.inner.source
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        self.inner.runtime.track(self.inner.source);
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read like [`get`](Self::get).
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this same signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.runtime.track(self.inner.source);
        f(&self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// Returns the value that was set. If it equals the current value,
    /// nothing is notified.
    pub fn set(&self, value: T) -> T {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return value;
            }
            *current = value.clone();
        }

        self.inner.runtime.notify(self.inner.source);
        value
    }

    /// Update the value using a function of the previous value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> T {
        let previous = self.get_untracked();
        self.set(f(&previous))
    }

    /// Register a callback invoked after every change.
    ///
    /// A panic inside the callback is reported through the runtime and
    /// does not stop the remaining subscribers.
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.inner
            .runtime
            .add_callback(self.inner.source, Rc::new(callback))
    }

    /// Get the number of subscribers (runners and callbacks).
    pub fn subscriber_count(&self) -> usize {
        self.inner.runtime.subscriber_count(self.inner.source)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl Runtime {
    /// Create a signal in this runtime. See [`Signal::new`].
    pub fn create_signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + 'static,
    {
        Signal::new(self, value)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
