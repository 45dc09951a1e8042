//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns one dependency graph and schedules updates when signals
//! change.
//!
//! # How It Works
//!
//! 1. When a signal, memo or effect is created, it registers a node with the
//!    runtime.
//!
//! 2. When a memo or effect reads a reactive value, the runtime records the
//!    dependency together with the version it observed.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Bumps the signal's version
//!    b. Marks direct dependents "dirty" and transitive ones "maybe dirty"
//!    c. Queues the effects it reached
//!    d. Flushes the queue unless a batch is open
//!
//! 4. Memos are lazy - they re-check their inputs on next access.
//!
//! # Thread Safety
//!
//! Every runtime is an independent graph: nothing is shared between two
//! runtimes. Within one runtime, every operation holds a reentrant execution
//! lock, so calls from different threads are serialized while nested calls on
//! the same thread (a memo reading a memo) proceed normally.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use super::context::ReactiveContext;
use super::effect::EffectInner;
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::graph::{Dependency, DirtyState, GraphSnapshot, NodeId, NodeKind, UpdateScheduler};

/// A computed node the runtime can ask to re-evaluate.
pub(crate) trait Reactive: Send + Sync {
    /// Get the node ID for this reactive value.
    fn node_id(&self) -> NodeId;

    /// Re-run the computation, update the cached value and mark the node
    /// clean, or dirty again if an input changed while it ran. Bumps the
    /// node's version only when the value changed.
    fn recompute(&self) -> Result<()>;
}

/// Mutable state of one graph, guarded by the runtime's execution lock.
#[derive(Debug, Default)]
pub(crate) struct GraphState {
    pub(crate) scheduler: UpdateScheduler,
    pub(crate) context: ReactiveContext,
    batch_depth: usize,
    flushing: bool,
}

type ErrorHandler = Arc<dyn Fn(&ReactiveError) + Send + Sync>;

struct RuntimeInner {
    /// Process-unique id, used to tell runtimes apart in logs.
    id: u64,

    config: RuntimeConfig,

    /// The graph itself. The reentrant lock serializes threads; the `RefCell`
    /// is only ever borrowed for short bookkeeping, never across user code.
    graph: ReentrantMutex<RefCell<GraphState>>,

    /// Memos and linked signals. Weak so that dropping the last handle frees
    /// the value.
    computed: DashMap<NodeId, Weak<dyn Reactive>>,

    /// Live effects. Strong: an effect lives until it is disposed.
    effects: DashMap<NodeId, Arc<EffectInner>>,

    error_handler: RwLock<Option<ErrorHandler>>,
}

/// A reactive graph instance.
///
/// Cloning a `Runtime` yields another handle to the same graph.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

static RUNTIME_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let id = RUNTIME_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        debug!(runtime = %config.label, id, "runtime created");

        Self {
            inner: Arc::new(RuntimeInner {
                id,
                config,
                graph: ReentrantMutex::new(RefCell::new(GraphState::default())),
                computed: DashMap::new(),
                effects: DashMap::new(),
                error_handler: RwLock::new(None),
            }),
        }
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    fn label(&self) -> &str {
        &self.inner.config.label
    }

    /// Whether two handles refer to the same graph.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Install the handler that receives effect failures and other errors
    /// that have no caller to return to. Replaces any previous handler.
    ///
    /// Without a handler, errors are logged with `tracing::error!`.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&ReactiveError) + Send + Sync + 'static,
    {
        *self.inner.error_handler.write() = Some(Arc::new(handler));
    }

    pub(crate) fn report(&self, err: &ReactiveError) {
        let handler = self.inner.error_handler.read().clone();
        match handler {
            Some(handler) => handler(err),
            None => error!(runtime = %self.label(), error = %err, "unhandled reactive error"),
        }
    }

    // ------------------------------------------------------------------------
    // Graph access
    // ------------------------------------------------------------------------

    /// Acquire the execution lock. Reentrant on the current thread.
    pub(crate) fn exec(&self) -> ReentrantMutexGuard<'_, RefCell<GraphState>> {
        self.inner.graph.lock()
    }

    /// Run a short bookkeeping closure against the graph state.
    ///
    /// `f` must not call back into user code.
    pub(crate) fn with_graph<R>(&self, f: impl FnOnce(&mut GraphState) -> R) -> R {
        let guard = self.inner.graph.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    pub(crate) fn register_node(&self, kind: NodeKind) -> NodeId {
        let id = self.with_graph(|g| g.scheduler.add_node(kind));
        trace!(runtime = %self.label(), node = %id, ?kind, "node registered");
        id
    }

    pub(crate) fn register_computed(&self, id: NodeId, reactive: Weak<dyn Reactive>) {
        self.inner.computed.insert(id, reactive);
    }

    pub(crate) fn register_effect(&self, effect: Arc<EffectInner>) {
        self.inner.effects.insert(effect.id(), effect);
    }

    /// Remove a node and every edge touching it.
    pub(crate) fn remove_node(&self, id: NodeId) {
        self.inner.computed.remove(&id);
        self.inner.effects.remove(&id);
        self.with_graph(|g| g.scheduler.remove_node(id));
    }

    /// Current version of a node.
    pub(crate) fn version(&self, id: NodeId) -> u64 {
        self.with_graph(|g| g.scheduler.version(id)).unwrap_or_default()
    }

    pub(crate) fn dirty_state(&self, id: NodeId) -> Option<DirtyState> {
        self.with_graph(|g| g.scheduler.dirty_state(id))
    }

    pub(crate) fn dependent_count(&self, id: NodeId) -> usize {
        self.with_graph(|g| {
            g.scheduler
                .get_node(id)
                .map_or(0, |node| node.dependents().len())
        })
    }

    pub(crate) fn dependency_count(&self, id: NodeId) -> usize {
        self.with_graph(|g| {
            g.scheduler
                .get_node(id)
                .map_or(0, |node| node.dependencies().len())
        })
    }

    /// Number of live nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.with_graph(|g| g.scheduler.node_count())
    }

    /// Capture the current shape of the graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.with_graph(|g| GraphSnapshot::capture(self.label(), &g.scheduler))
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    /// Record a read of `id` for the computation currently running, if any.
    pub(crate) fn track_read(&self, id: NodeId) {
        self.with_graph(|g| {
            if !g.context.is_tracking() {
                return;
            }
            if let Some(version) = g.scheduler.version(id) {
                g.context.track_dependency(Dependency { id, version });
            }
        });
    }

    /// Run `f` as the evaluation of `node`, then replace the node's edges with
    /// whatever `f` read.
    pub(crate) fn evaluate<R>(&self, node: NodeId, f: impl FnOnce() -> R) -> R {
        let _exec = self.exec();
        self.with_graph(|g| g.context.enter(node));
        let frame = FrameGuard { runtime: self };

        let value = f();

        let dependencies = self.with_graph(|g| g.context.get_dependencies());
        drop(frame);
        self.with_graph(|g| g.scheduler.replace_dependencies(node, dependencies));
        value
    }

    /// Run `f` without recording any dependency, returning its result.
    ///
    /// Prior tracking resumes once `f` returns, including when it panics.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _exec = self.exec();
        self.with_graph(|g| g.context.enter_untracked());
        let _frame = FrameGuard { runtime: self };
        f()
    }

    /// Check whether reads would currently be recorded as dependencies.
    pub fn is_tracking(&self) -> bool {
        self.with_graph(|g| g.context.is_tracking())
    }

    /// The node whose evaluation is currently collecting dependencies.
    pub fn current_subscriber(&self) -> Option<NodeId> {
        self.with_graph(|g| g.context.current_subscriber())
    }

    // ------------------------------------------------------------------------
    // Freshness
    // ------------------------------------------------------------------------

    /// Bring a computed node up to date, recomputing it if any of its inputs
    /// changed since it last ran.
    pub(crate) fn refresh(&self, node: NodeId) -> Result<()> {
        let _exec = self.exec();

        let state = match self.dirty_state(node) {
            None | Some(DirtyState::Clean) => return Ok(()),
            Some(state) => state,
        };

        if !self.with_graph(|g| g.context.begin_refresh(node)) {
            return Err(ReactiveError::CyclicDependency { node });
        }
        let _mark = RefreshGuard { runtime: self, node };

        let stale = match state {
            DirtyState::MaybeDirty => self.dependencies_changed(node),
            _ => true,
        };

        if stale {
            self.recompute(node)
        } else {
            trace!(runtime = %self.label(), node = %node, "inputs unchanged");
            self.with_graph(|g| g.scheduler.mark_clean(node));
            Ok(())
        }
    }

    /// Check the recorded inputs of `node`, refreshing computed ones first.
    ///
    /// An input that fails to refresh counts as changed: the error belongs to
    /// whoever reads that input, which is `node`'s own computation.
    fn dependencies_changed(&self, node: NodeId) -> bool {
        let dependencies: SmallVec<[Dependency; 4]> = self.with_graph(|g| {
            g.scheduler
                .get_node(node)
                .map(|n| n.dependencies().iter().copied().collect())
                .unwrap_or_default()
        });

        for dep in dependencies {
            let kind = self.with_graph(|g| g.scheduler.get_node(dep.id).map(|n| n.kind()));
            match kind {
                None => continue,
                Some(kind) if kind.is_computed() => {
                    if let Err(err) = self.refresh(dep.id) {
                        trace!(
                            runtime = %self.label(),
                            node = %node,
                            input = %dep.id,
                            error = %err,
                            "input failed"
                        );
                        return true;
                    }
                }
                Some(_) => {}
            }

            if self.version(dep.id) != dep.version {
                return true;
            }
        }

        false
    }

    fn recompute(&self, node: NodeId) -> Result<()> {
        let reactive = self
            .inner
            .computed
            .get(&node)
            .and_then(|entry| entry.value().upgrade());

        match reactive {
            Some(reactive) => {
                trace!(runtime = %self.label(), node = %reactive.node_id(), "recompute");
                reactive.recompute()
            }
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------------

    /// Record a change of `id`'s value and propagate staleness.
    pub(crate) fn notify_changed(&self, id: NodeId) {
        let _exec = self.exec();
        let touched = self.with_graph(|g| {
            g.scheduler.bump_version(id);
            g.scheduler.mark_changed(id)
        });
        trace!(runtime = %self.label(), node = %id, touched, "value changed");
        self.flush();
    }

    /// Queue an effect and flush if nothing is holding the queue back.
    pub(crate) fn schedule_effect(&self, id: NodeId) {
        let _exec = self.exec();
        self.with_graph(|g| {
            g.scheduler.mark_dirty(id);
            g.scheduler.schedule(id);
        });
        self.flush();
    }

    /// Forget an effect: no more edges, no pending run.
    pub(crate) fn dispose_effect(&self, id: NodeId) {
        let _exec = self.exec();
        self.remove_node(id);
        debug!(runtime = %self.label(), effect = %id, "effect disposed");
    }

    /// Open a batch. Writes made until the returned guard is dropped (or
    /// [`BatchGuard::end`] is called) only mark nodes stale; effects run once
    /// when the outermost batch closes.
    pub fn begin_batch(&self) -> BatchGuard {
        self.with_graph(|g| g.batch_depth += 1);
        BatchGuard {
            runtime: self.clone(),
        }
    }

    /// Run `f` inside a batch and return its result.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _exec = self.exec();
        let _batch = self.begin_batch();
        f()
    }

    /// Whether a batch is currently open.
    pub fn is_batching(&self) -> bool {
        self.with_graph(|g| g.batch_depth > 0)
    }

    fn end_batch(&self) {
        let _exec = self.exec();
        let depth = self.with_graph(|g| {
            g.batch_depth = g.batch_depth.saturating_sub(1);
            g.batch_depth
        });

        if depth == 0 {
            debug!(runtime = %self.label(), "batch closed");
            self.flush();
        }
    }

    /// Run pending effects until the queue is empty.
    ///
    /// Does nothing while a batch is open or when called from inside a flush;
    /// effects queued by a running effect are picked up by the outer loop.
    fn flush(&self) {
        let _exec = self.exec();

        let start = self.with_graph(|g| {
            if g.flushing || g.batch_depth > 0 {
                false
            } else {
                g.flushing = true;
                true
            }
        });
        if !start {
            return;
        }
        let _flushing = FlushGuard { runtime: self };

        let limit = self.inner.config.max_effect_runs;
        let mut runs = 0usize;

        while let Some(id) = self.with_graph(|g| g.scheduler.pop_pending()) {
            let Some(effect) = self.inner.effects.get(&id).map(|e| Arc::clone(e.value())) else {
                continue;
            };

            if !self.effect_is_stale(id) {
                self.with_graph(|g| g.scheduler.mark_clean(id));
                continue;
            }

            if runs >= limit {
                let dropped = self.with_graph(|g| g.scheduler.clear_pending()) + 1;
                warn!(runtime = %self.label(), runs, dropped, "effects did not settle, dropping queue");
                self.report(&ReactiveError::RunawayEffects { runs });
                break;
            }

            runs += 1;
            effect.run(self);
        }

        if runs > 0 {
            debug!(runtime = %self.label(), runs, "flush complete");
        }
    }

    fn effect_is_stale(&self, id: NodeId) -> bool {
        match self.dirty_state(id) {
            Some(DirtyState::Dirty) => true,
            Some(DirtyState::MaybeDirty) => self.dependencies_changed(id),
            Some(DirtyState::Clean) | None => false,
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.inner.id)
            .field("label", &self.label())
            .field("node_count", &self.node_count())
            .finish()
    }
}

/// Handle to an open batch. Closing the outermost batch flushes effects.
///
/// The batch belongs to the whole runtime, not to the thread that opened it:
/// while a guard is alive, writes made on any thread only mark nodes stale,
/// and their effects wait for the outermost batch to close.
#[must_use = "the batch closes as soon as the guard is dropped"]
pub struct BatchGuard {
    runtime: Runtime,
}

impl BatchGuard {
    /// Close the batch now.
    pub fn end(self) {}
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.runtime.end_batch();
    }
}

impl fmt::Debug for BatchGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchGuard").finish_non_exhaustive()
    }
}

/// Pops the top context frame when dropped.
///
/// This keeps the context stack balanced even if the computation panics.
struct FrameGuard<'a> {
    runtime: &'a Runtime,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.runtime.with_graph(|g| g.context.exit());
    }
}

struct RefreshGuard<'a> {
    runtime: &'a Runtime,
    node: NodeId,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        let node = self.node;
        self.runtime.with_graph(|g| g.context.end_refresh(node));
    }
}

struct FlushGuard<'a> {
    runtime: &'a Runtime,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.runtime.with_graph(|g| g.flushing = false);
    }
}
