//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies. Inside a batch, that first run waits for the
//!    batch to close.
//!
//! 2. When any dependency changes, the effect is queued. Queued effects run
//!    after the write (or the enclosing batch) completes, in the order they
//!    were created, at most once per flush round.
//!
//! 3. Every run rebuilds the dependency set from scratch, so an effect only
//!    reacts to what it read last time.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! An effect can register cleanup callbacks through its [`EffectContext`].
//! Callbacks registered during one run are called before the next run starts
//! and when the effect is disposed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::runtime::Runtime;
use crate::error::{BoxError, ReactiveError};
use crate::graph::{NodeId, NodeKind};

type EffectFn = Box<dyn FnMut(&EffectContext) -> Result<(), BoxError> + Send>;
type CleanupFn = Box<dyn FnOnce() + Send>;

/// Capabilities handed to an effect while it runs.
pub struct EffectContext {
    cleanups: RefCell<Vec<CleanupFn>>,
    first_run: Cell<bool>,
}

impl EffectContext {
    fn new(first_run: bool) -> Self {
        Self {
            cleanups: RefCell::new(Vec::new()),
            first_run: Cell::new(first_run),
        }
    }

    /// Register a callback to run before the effect runs again, or when it is
    /// disposed. Callbacks run in registration order.
    pub fn on_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cleanups.borrow_mut().push(Box::new(cleanup));
    }

    /// Whether this is the effect's first run.
    pub fn is_first_run(&self) -> bool {
        self.first_run.get()
    }

    fn into_cleanups(self) -> Vec<CleanupFn> {
        self.cleanups.into_inner()
    }
}

/// Shared state of one effect. The runtime keeps it alive until disposal.
pub(crate) struct EffectInner {
    id: NodeId,

    /// The effect function.
    run: Mutex<EffectFn>,

    /// Cleanups registered by the last run.
    cleanups: Mutex<Vec<CleanupFn>>,

    disposed: AtomicBool,

    run_count: AtomicUsize,
}

impl EffectInner {
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Execute the effect function within a tracking frame.
    pub(crate) fn run(&self, runtime: &Runtime) {
        if self.is_disposed() {
            return;
        }

        self.run_cleanups();

        // Clean before running: writes made by the run itself re-dirty it.
        runtime.with_graph(|g| g.scheduler.mark_clean(self.id));

        let cx = EffectContext::new(self.run_count.load(Ordering::SeqCst) == 0);
        let outcome = runtime.evaluate(self.id, || {
            let mut run = self.run.lock();
            (*run)(&cx)
        });

        *self.cleanups.lock() = cx.into_cleanups();
        let runs = self.run_count.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(effect = %self.id, runs, "effect ran");

        if self.is_disposed() {
            // Disposed from inside its own run
            self.run_cleanups();
        }

        if let Err(source) = outcome {
            runtime.report(&ReactiveError::effect(self.id, source));
        }
    }

    fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        for cleanup in cleanups {
            cleanup();
        }
    }

    pub(crate) fn dispose(&self, runtime: &Runtime) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        runtime.dispose_effect(self.id);
        self.run_cleanups();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Cloning an `Effect` yields another handle to the same effect. Dropping the
/// handles does not stop it; call [`dispose`](Effect::dispose) or create it
/// through a [`Scope`](super::Scope).
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Effect, Runtime, Signal};
///
/// let runtime = Runtime::new();
/// let count = Signal::new(&runtime, 0);
///
/// let watched = count.clone();
/// let effect = Effect::new(&runtime, move |_| {
///     println!("Count is: {}", watched.get());
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    runtime: Runtime,
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately (or when the enclosing batch closes) to
    /// establish initial dependencies.
    pub fn new<F>(runtime: &Runtime, mut run: F) -> Self
    where
        F: FnMut(&EffectContext) + Send + 'static,
    {
        Self::try_new(runtime, move |cx| {
            run(cx);
            Ok::<(), BoxError>(())
        })
    }

    /// Create an effect whose function may fail.
    ///
    /// Failures are passed to the runtime's error handler as
    /// [`ReactiveError::EffectFailure`]. The dependencies read before the
    /// failure are kept, so a later change retries the effect.
    pub fn try_new<F, E>(runtime: &Runtime, run: F) -> Self
    where
        F: FnMut(&EffectContext) -> Result<(), E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let effect = Self::new_lazy(runtime, run);
        effect.schedule();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// The effect first runs on [`schedule`](Effect::schedule).
    pub fn new_lazy<F, E>(runtime: &Runtime, mut run: F) -> Self
    where
        F: FnMut(&EffectContext) -> Result<(), E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let id = runtime.register_node(NodeKind::Effect);
        let inner = Arc::new(EffectInner {
            id,
            run: Mutex::new(Box::new(move |cx: &EffectContext| -> Result<(), BoxError> {
                run(cx).map_err(Into::into)
            })),
            cleanups: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        runtime.register_effect(Arc::clone(&inner));

        Self {
            runtime: runtime.clone(),
            inner,
        }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Schedule the effect to re-run.
    ///
    /// Runs right away unless a batch or flush is in progress. Does nothing
    /// once the effect is disposed.
    pub fn schedule(&self) {
        if !self.is_disposed() {
            self.runtime.schedule_effect(self.inner.id);
        }
    }

    /// Dispose of the effect.
    ///
    /// Runs the last registered cleanups and detaches the effect from the
    /// graph. After disposal, the effect will not run again. Calling this
    /// more than once has no further effect.
    pub fn dispose(&self) {
        self.inner.dispose(&self.runtime);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.runtime.dependency_count(self.inner.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
