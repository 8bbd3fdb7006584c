//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds,
//! effects and reactive state.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! while a computed or effect is running, the signal registers that runner as
//! a dependent. When the signal's value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changed, and only when it is next read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change. Effects synchronize reactive state with the world
//! outside the graph.
//!
//! ## State
//!
//! A State is a keyed record with one dependency source per key, plus global
//! listeners that see every mutation.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically. Every runner executes inside a
//! [`ReactiveContext`] frame on its runtime's stack, and every read records an
//! edge for the runner on top of that stack. The stack belongs to a
//! [`Runtime`] value rather than to the thread, so independent runtimes never
//! see each other's reads.

mod computed;
mod context;
mod effect;
mod runtime;
mod signal;
mod state;
mod subscriber;

pub use computed::{Computed, ComputedState};
pub use context::ReactiveContext;
pub use effect::{Cleanup, Effect, EffectOutput};
pub use runtime::Runtime;
pub use signal::Signal;
pub use state::{State, RESERVED_KEYS};
pub use subscriber::Subscription;
