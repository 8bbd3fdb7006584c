//! Lattice Reactive
//!
//! This crate provides the fine-grained reactive core of Lattice.
//! It implements:
//!
//! - Signals: single reactive values with get, set and subscribe
//! - Effects: computations re-run whenever what they read changes
//! - Computeds: cached derived values, recomputed lazily
//! - State: keyed records with per-key tracking and global listeners
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the primitives and the [`Runtime`] that connects them
//! - `graph`: the arena of sources, runners and their dependency edges
//! - `config`: runtime configuration
//! - `error`: returned errors and reported failures
//!
//! Everything is single-threaded and synchronous. A change propagates on the
//! stack of the `set` call that caused it.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use lattice_reactive::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = rt.create_signal(0);
//!
//! // Create a derived value
//! let doubled = rt.create_computed({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! rt.create_effect({
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     move || log.borrow_mut().push((count.get(), doubled.get()))
//! });
//!
//! // Update the signal; the effect runs again before `set` returns
//! count.set(5);
//! assert_eq!(*log.borrow(), vec![(0, 0), (5, 10)]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{Origin, ReactiveError, ReportedError};
pub use graph::{RunnerId, SourceId};
pub use reactive::{
    Cleanup, Computed, ComputedState, Effect, EffectOutput, Runtime, Signal, State, Subscription,
};
