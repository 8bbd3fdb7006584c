//! Reactive State
//!
//! A [`State`] is a keyed record where every key behaves like its own signal.
//! Reading a key inside an effect or computed subscribes to that key only;
//! writing a key re-runs just the runners that read it.
//!
//! On top of per-key tracking, a state has global listeners. They are plain
//! callbacks that receive `(key, old, new)` for every mutation and take no
//! part in dependency tracking. `None` stands for "no value" on either side,
//! so an insertion has `old = None` and a deletion has `new = None`.
//!
//! Keys get their source lazily, the first time a runner reads them. A
//! runner reading a key that does not exist yet still creates one, so an
//! effect waiting for a key runs when it appears.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::trace;

use super::runtime::Runtime;
use super::subscriber::Subscription;
use crate::error::{Origin, ReactiveError};
use crate::graph::SourceId;

/// Keys reserved for the state's own accessors.
pub const RESERVED_KEYS: [&str; 2] = ["subscribe", "inspect"];

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

fn reject_reserved(key: &str) -> Result<(), ReactiveError> {
    if is_reserved(key) {
        Err(ReactiveError::ReservedKey(key.to_string()))
    } else {
        Ok(())
    }
}

type Listener<V> = Rc<dyn Fn(&str, Option<&V>, Option<&V>)>;

struct StateInner<V> {
    runtime: Runtime,
    values: RefCell<IndexMap<String, V>>,
    sources: RefCell<IndexMap<String, SourceId>>,
    listeners: RefCell<IndexMap<u64, Listener<V>>>,
    next_listener: Cell<u64>,
}

impl<V> Drop for StateInner<V> {
    fn drop(&mut self) {
        for (_, source) in self.sources.get_mut().drain(..) {
            self.runtime.release_source(source);
        }
    }
}

/// A reactive keyed record.
///
/// The default value type is [`serde_json::Value`], which makes a state a
/// reactive JSON object; any `Clone + PartialEq` type works.
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use lattice_reactive::{Runtime, State};
/// use serde_json::json;
///
/// let rt = Runtime::new();
/// let state = State::from_json(&rt, json!({ "x": 0 })).unwrap();
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// rt.create_effect({
///     let (state, seen) = (state.clone(), seen.clone());
///     move || seen.borrow_mut().push(state.get("x"))
/// });
///
/// state.set("x", json!(1)).unwrap();
/// state.set("x", json!(1)).unwrap();
/// assert_eq!(*seen.borrow(), vec![Some(json!(0)), Some(json!(1))]);
/// ```
pub struct State<V = Value> {
    inner: Rc<StateInner<V>>,
}

impl<V> State<V>
where
    V: Clone + PartialEq + 'static,
{
    /// Wrap a record. Fails if it uses a reserved key.
    pub fn new(runtime: &Runtime, initial: IndexMap<String, V>) -> Result<Self, ReactiveError> {
        if let Some(key) = initial.keys().find(|key| is_reserved(key)) {
            return Err(ReactiveError::ReservedKey(key.clone()));
        }
        Ok(Self {
            inner: Rc::new(StateInner {
                runtime: runtime.clone(),
                values: RefCell::new(initial),
                sources: RefCell::new(IndexMap::new()),
                listeners: RefCell::new(IndexMap::new()),
                next_listener: Cell::new(0),
            }),
        })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Source of `key`, created on first use.
    fn source_for(&self, key: &str) -> SourceId {
        if let Some(source) = self.inner.sources.borrow().get(key) {
            return *source;
        }
        let source = self.inner.runtime.add_source();
        self.inner
            .sources
            .borrow_mut()
            .insert(key.to_string(), source);
        source
    }

    /// Read a key, subscribing the current runner to it.
    ///
    /// Reserved keys always read as `None` and are never tracked. Outside
    /// a runner this is a plain lookup and creates no source.
    pub fn get(&self, key: &str) -> Option<V> {
        if is_reserved(key) {
            return None;
        }
        if self.inner.runtime.is_tracking() {
            let source = self.source_for(key);
            self.inner.runtime.track(source);
        }
        self.inner.values.borrow().get(key).cloned()
    }

    /// Read a key without tracking.
    pub fn get_untracked(&self, key: &str) -> Option<V> {
        self.inner.values.borrow().get(key).cloned()
    }

    /// Write a key.
    ///
    /// Writing a value equal to the current one stores it and does nothing
    /// else. Otherwise the key's subscribers run first, then every global
    /// listener receives `(key, old, new)`.
    pub fn set(&self, key: &str, value: V) -> Result<(), ReactiveError> {
        reject_reserved(key)?;

        let old = {
            let mut values = self.inner.values.borrow_mut();
            if values.get(key) == Some(&value) {
                values.insert(key.to_string(), value);
                return Ok(());
            }
            values.insert(key.to_string(), value.clone())
        };

        trace!(key, "state key changed");
        let source = self.inner.sources.borrow().get(key).copied();
        if let Some(source) = source {
            self.inner.runtime.notify(source);
        }
        self.emit(key, old.as_ref(), Some(&value));
        Ok(())
    }

    /// Delete a key.
    ///
    /// Returns `Ok(false)` without notifying anyone if the key is absent.
    /// Otherwise the key's source is discarded, its subscribers run, and
    /// every global listener receives `(key, old, None)`.
    pub fn delete(&self, key: &str) -> Result<bool, ReactiveError> {
        reject_reserved(key)?;

        let old = self.inner.values.borrow_mut().shift_remove(key);
        let Some(old) = old else {
            return Ok(false);
        };

        trace!(key, "state key deleted");
        // Detach the source before notifying: runners that re-read the key
        // subscribe to a fresh source and see it if it is written again.
        let source = self.inner.sources.borrow_mut().shift_remove(key);
        if let Some(source) = source {
            self.inner.runtime.notify(source);
            self.inner.runtime.release_source(source);
        }
        self.emit(key, Some(&old), None);
        Ok(true)
    }

    fn emit(&self, key: &str, old: Option<&V>, new: Option<&V>) {
        let listeners: SmallVec<[Listener<V>; 4]> =
            self.inner.listeners.borrow().values().cloned().collect();
        let runtime = &self.inner.runtime;
        for listener in listeners {
            runtime.guard(Origin::StateListener, None, || {
                runtime.untrack(|| listener(key, old, new))
            });
        }
    }

    /// Register a global mutation listener.
    pub fn subscribe(
        &self,
        listener: impl Fn(&str, Option<&V>, Option<&V>) + 'static,
    ) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .insert(id, Rc::new(listener));

        let state: Weak<StateInner<V>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                let removed = state.listeners.borrow_mut().shift_remove(&id);
                drop(removed);
            }
        })
    }

    /// A plain copy of every key. Reading it is never tracked.
    pub fn inspect(&self) -> IndexMap<String, V> {
        self.inner.values.borrow().clone()
    }

    /// Whether the key is present. Not tracked.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.values.borrow().contains_key(key)
    }

    /// Current keys in insertion order. Not tracked.
    pub fn keys(&self) -> Vec<String> {
        self.inner.values.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.borrow().is_empty()
    }
}

impl State<Value> {
    /// Wrap a JSON object.
    pub fn from_json(runtime: &Runtime, value: Value) -> Result<Self, ReactiveError> {
        match value {
            Value::Object(map) => Self::new(runtime, map.into_iter().collect()),
            other => Err(ReactiveError::NotAnObject {
                found: json_kind(&other).to_string(),
            }),
        }
    }

    /// An untracked snapshot as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.inspect().into_iter().collect())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl<V> Clone for State<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V> Debug for State<V>
where
    V: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("values", &*self.inner.values.borrow())
            .field("tracked_keys", &self.inner.sources.borrow().len())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

impl Runtime {
    /// Create a reactive state in this runtime. See [`State::new`].
    pub fn create_state<V>(&self, initial: IndexMap<String, V>) -> Result<State<V>, ReactiveError>
    where
        V: Clone + PartialEq + 'static,
    {
        State::new(self, initial)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
