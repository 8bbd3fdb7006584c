//! Dependency Graph
//!
//! This module implements the arena that records which runners depend on
//! which sources.
//!
//! # Overview
//!
//! - Sources are signals, computeds, or single keys of a reactive state.
//! - Runners are the re-invocable bodies of effects and computeds.
//! - An edge `source -> runner` exists when the runner read the source during
//!   its current run. Both directions are stored so either side can be
//!   removed in one pass.
//!
//! # Run protocol
//!
//! Dependency sets are dynamic. Every run of a runner goes through:
//!
//! 1. [`DependencyGraph::begin_run`] drops every edge of the runner.
//! 2. [`DependencyGraph::track`] adds an edge for each source read.
//! 3. The run ends when the body returns; nothing else is needed.
//!
//! After step 3 the runner's dependency set and the sources' subscriber sets
//! agree exactly.
//!
//! The graph is generic over the runner handle `R` and callback type `C` so
//! it stays free of any knowledge about how runners execute.

mod node;

use slotmap::SlotMap;

pub use node::{CallbackId, CallbackNode, RunnerId, RunnerKind, RunnerNode, SourceId, SourceNode, Subscriber};

/// Arena of sources, runners and plain callbacks.
#[derive(Debug)]
pub struct DependencyGraph<R, C> {
    sources: SlotMap<SourceId, SourceNode>,
    runners: SlotMap<RunnerId, RunnerNode<R>>,
    callbacks: SlotMap<CallbackId, CallbackNode<C>>,
}

/// Everything detached from the graph by [`DependencyGraph::remove_source`].
///
/// Returned to the caller so user closures are dropped outside any borrow of
/// the graph.
pub struct RemovedSource<C> {
    pub node: SourceNode,
    pub callbacks: Vec<C>,
}

impl<R, C> DependencyGraph<R, C> {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            sources: SlotMap::with_key(),
            runners: SlotMap::with_key(),
            callbacks: SlotMap::with_key(),
        }
    }

    /// Add a source with no subscribers.
    pub fn add_source(&mut self) -> SourceId {
        self.sources.insert(SourceNode::default())
    }

    /// Remove a source.
    ///
    /// Every runner that depended on it forgets the edge, and every callback
    /// subscribed to it is detached.
    pub fn remove_source(&mut self, id: SourceId) -> Option<RemovedSource<C>> {
        let node = self.sources.remove(id)?;
        let mut callbacks = Vec::new();
        for subscriber in node.subscribers() {
            match *subscriber {
                Subscriber::Runner(runner) => {
                    if let Some(runner) = self.runners.get_mut(runner) {
                        runner.remove_dependency(id);
                    }
                }
                Subscriber::Callback(callback) => {
                    if let Some(callback) = self.callbacks.remove(callback) {
                        callbacks.push(callback.into_callback());
                    }
                }
            }
        }
        Some(RemovedSource { node, callbacks })
    }

    pub fn source(&self, id: SourceId) -> Option<&SourceNode> {
        self.sources.get(id)
    }

    pub fn contains_source(&self, id: SourceId) -> bool {
        self.sources.contains_key(id)
    }

    /// Subscribers of a source in subscription order.
    pub fn subscribers(&self, id: SourceId) -> impl Iterator<Item = Subscriber> + '_ {
        self.sources
            .get(id)
            .into_iter()
            .flat_map(|node| node.subscribers().iter().copied())
    }

    /// Add a runner with an empty dependency set and no handle yet.
    pub fn add_runner(&mut self, kind: RunnerKind) -> RunnerId {
        self.runners.insert(RunnerNode::new(kind))
    }

    /// Attach the handle of a runner created by [`add_runner`](Self::add_runner).
    ///
    /// Returns `false` if the runner no longer exists.
    pub fn attach(&mut self, id: RunnerId, handle: R) -> bool {
        match self.runners.get_mut(id) {
            Some(node) => {
                node.attach(handle);
                true
            }
            None => false,
        }
    }

    /// Remove a runner and every edge it has.
    ///
    /// Returns the handle so the caller decides when it is dropped.
    pub fn remove_runner(&mut self, id: RunnerId) -> Option<R> {
        self.begin_run(id);
        self.runners.remove(id).and_then(RunnerNode::into_handle)
    }

    pub fn runner(&self, id: RunnerId) -> Option<&RunnerNode<R>> {
        self.runners.get(id)
    }

    pub fn contains_runner(&self, id: RunnerId) -> bool {
        self.runners.contains_key(id)
    }

    pub fn runner_ids(&self) -> Vec<RunnerId> {
        self.runners.keys().collect()
    }

    /// Drop every edge of a runner before it executes again.
    ///
    /// Returns the number of edges removed.
    pub fn begin_run(&mut self, id: RunnerId) -> usize {
        let Some(runner) = self.runners.get_mut(id) else {
            return 0;
        };
        let previous = runner.take_dependencies();
        for source in &previous {
            if let Some(source) = self.sources.get_mut(*source) {
                source.remove_subscriber(Subscriber::Runner(id));
            }
        }
        previous.len()
    }

    /// Record that `runner` read `source` during its current run.
    ///
    /// Returns `false` if either node is gone or the edge already existed.
    pub fn track(&mut self, runner: RunnerId, source: SourceId) -> bool {
        let (Some(runner_node), Some(source_node)) =
            (self.runners.get_mut(runner), self.sources.get_mut(source))
        else {
            return false;
        };
        let added = runner_node.add_dependency(source);
        source_node.add_subscriber(Subscriber::Runner(runner));
        added
    }

    /// Attach a plain callback to a source.
    pub fn add_callback(&mut self, source: SourceId, callback: C) -> Option<CallbackId> {
        let source_node = self.sources.get_mut(source)?;
        let id = self.callbacks.insert(CallbackNode::new(source, callback));
        source_node.add_subscriber(Subscriber::Callback(id));
        Some(id)
    }

    /// Detach a plain callback. Returns it so the caller can drop it.
    pub fn remove_callback(&mut self, id: CallbackId) -> Option<C> {
        let node = self.callbacks.remove(id)?;
        if let Some(source) = self.sources.get_mut(node.source()) {
            source.remove_subscriber(Subscriber::Callback(id));
        }
        Some(node.into_callback())
    }

    pub fn callback(&self, id: CallbackId) -> Option<&C> {
        self.callbacks.get(id).map(CallbackNode::callback)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn runner_count(&self) -> usize {
        self.runners.len()
    }
}

impl<R, C> Default for DependencyGraph<R, C> {
    fn default() -> Self {
        Self::new()
    }
}
