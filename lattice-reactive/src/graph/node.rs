//! Graph Nodes
//!
//! This module defines the records stored in the dependency graph arena.

use indexmap::IndexSet;
use slotmap::new_key_type;

new_key_type! {
    /// Identifier of a dependency source (a signal, a computed, or one key of
    /// a reactive state record).
    pub struct SourceId;

    /// Identifier of a runner (the body of an effect or computed).
    pub struct RunnerId;

    /// Identifier of a plain subscriber callback attached to one source.
    pub struct CallbackId;
}

/// One entry in a source's subscriber set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subscriber {
    /// A runner that read the source during its last run.
    Runner(RunnerId),
    /// A plain callback registered with `subscribe`.
    Callback(CallbackId),
}

/// The kind of computation a runner performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    /// Re-runs eagerly when notified.
    Effect,
    /// Marks itself dirty when notified and recomputes on the next read.
    Computed,
}

/// A dependency source.
///
/// Sources have no outgoing edges, only subscribers, kept in the order they
/// subscribed.
#[derive(Debug, Default)]
pub struct SourceNode {
    subscribers: IndexSet<Subscriber>,
}

impl SourceNode {
    pub fn subscribers(&self) -> &IndexSet<Subscriber> {
        &self.subscribers
    }

    pub(super) fn add_subscriber(&mut self, subscriber: Subscriber) -> bool {
        self.subscribers.insert(subscriber)
    }

    pub(super) fn remove_subscriber(&mut self, subscriber: Subscriber) -> bool {
        // Keeps the remaining subscribers in subscription order.
        self.subscribers.shift_remove(&subscriber)
    }
}

/// A runner and the sources it read during its current run.
///
/// The handle is attached after the node is created, since the runner's own
/// state usually needs to know its [`RunnerId`].
#[derive(Debug)]
pub struct RunnerNode<R> {
    kind: RunnerKind,
    dependencies: IndexSet<SourceId>,
    handle: Option<R>,
}

impl<R> RunnerNode<R> {
    pub(super) fn new(kind: RunnerKind) -> Self {
        Self {
            kind,
            dependencies: IndexSet::new(),
            handle: None,
        }
    }

    pub fn kind(&self) -> RunnerKind {
        self.kind
    }

    pub fn dependencies(&self) -> &IndexSet<SourceId> {
        &self.dependencies
    }

    pub fn handle(&self) -> Option<&R> {
        self.handle.as_ref()
    }

    pub(super) fn attach(&mut self, handle: R) -> Option<R> {
        self.handle.replace(handle)
    }

    pub(super) fn add_dependency(&mut self, source: SourceId) -> bool {
        self.dependencies.insert(source)
    }

    pub(super) fn remove_dependency(&mut self, source: SourceId) -> bool {
        self.dependencies.shift_remove(&source)
    }

    pub(super) fn take_dependencies(&mut self) -> IndexSet<SourceId> {
        std::mem::take(&mut self.dependencies)
    }

    pub(super) fn into_handle(self) -> Option<R> {
        self.handle
    }
}

/// A plain callback and the source it listens to.
#[derive(Debug)]
pub struct CallbackNode<C> {
    source: SourceId,
    callback: C,
}

impl<C> CallbackNode<C> {
    pub(super) fn new(source: SourceId, callback: C) -> Self {
        Self { source, callback }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn callback(&self) -> &C {
        &self.callback
    }

    pub(super) fn into_callback(self) -> C {
        self.callback
    }
}
