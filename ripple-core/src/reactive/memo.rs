//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the memo is marked "dirty" (direct input) or
//!    "maybe dirty" (input of an input).
//!
//! 4. On next access, a maybe-dirty memo first brings its own inputs up to
//!    date and compares their versions with the ones it saw last time.
//!
//! 5. If inputs changed, recompute. Otherwise, mark clean and return cache.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! A recomputation that produces a value equal to the cached one does not
//! bump the memo's version, so memos and effects further downstream stay
//! clean.
//!
//! # Failures
//!
//! A computation may fail (see [`Memo::try_new`]). The error is returned to
//! the reader, the cached value is discarded and the memo stays dirty, so the
//! next read tries again.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::runtime::{Reactive, Runtime};
use crate::error::{BoxError, ReactiveError, Result};
use crate::graph::{DirtyState, NodeId, NodeKind};

type ComputeFn<T> = Box<dyn Fn(Option<&T>) -> std::result::Result<T, BoxError> + Send + Sync>;

/// Cached computation shared by [`Memo`] and
/// [`LinkedSignal`](super::LinkedSignal).
pub(crate) struct ComputedInner<T> {
    /// Unique identifier for this node.
    id: NodeId,

    runtime: Runtime,

    /// The computation function. Receives the previous value when
    /// `wants_previous` is set.
    compute: ComputeFn<T>,

    wants_previous: bool,

    /// The cached value (None if never computed or the last run failed).
    value: RwLock<Option<T>>,

    /// Number of times the computation ran.
    runs: AtomicUsize,
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    pub(crate) fn create(
        runtime: &Runtime,
        kind: NodeKind,
        wants_previous: bool,
        compute: ComputeFn<T>,
    ) -> Arc<Self> {
        let inner = Arc::new(Self {
            id: runtime.register_node(kind),
            runtime: runtime.clone(),
            compute,
            wants_previous,
            value: RwLock::new(None),
            runs: AtomicUsize::new(0),
        });

        let weak: Weak<dyn Reactive> = Arc::downgrade(&inner) as Weak<dyn Reactive>;
        runtime.register_computed(inner.id, weak);
        inner
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Bring the value up to date and return it, recording the read.
    pub(crate) fn try_get(&self) -> Result<T> {
        let _exec = self.runtime.exec();
        let refreshed = self.runtime.refresh(self.id);

        // Tracked even on failure, so the reader retries once this node recovers
        self.runtime.track_read(self.id);
        refreshed?;

        Ok(self
            .value
            .read()
            .clone()
            .expect("clean computed node should have a value"))
    }

    pub(crate) fn get_untracked(&self) -> Result<T> {
        self.runtime.untracked(|| self.try_get())
    }

    /// Replace the cached value from outside the computation.
    ///
    /// The node settles first so its sources are tracked, then the recorded
    /// source versions are re-captured: the override holds until one of those
    /// sources changes again.
    pub(crate) fn override_value(&self, value: T) {
        let _exec = self.runtime.exec();

        if let Err(err) = self.runtime.refresh(self.id) {
            tracing::debug!(node = %self.id, error = %err, "override replaces failed computation");
        }

        *self.value.write() = Some(value);

        let id = self.id;
        self.runtime.with_graph(|g| {
            let versions: SmallVec<[Option<u64>; 4]> = match g.scheduler.get_node(id) {
                Some(node) => node
                    .dependencies()
                    .iter()
                    .map(|dep| g.scheduler.version(dep.id))
                    .collect(),
                None => return,
            };

            if let Some(node) = g.scheduler.get_node_mut(id) {
                for (dep, version) in node.dependencies_mut().iter_mut().zip(versions) {
                    if let Some(version) = version {
                        dep.version = version;
                    }
                }
                node.mark_clean();
            }
        });

        self.runtime.notify_changed(id);
    }

    pub(crate) fn state(&self) -> DirtyState {
        self.runtime
            .dirty_state(self.id)
            .unwrap_or(DirtyState::Dirty)
    }

    pub(crate) fn has_value(&self) -> bool {
        self.value.read().is_some()
    }

    pub(crate) fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub(crate) fn dependent_count(&self) -> usize {
        self.runtime.dependent_count(self.id)
    }
}

impl<T> Reactive for ComputedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    /// Recompute the value.
    ///
    /// This runs the computation function within a reactive context to
    /// track dependencies.
    fn recompute(&self) -> Result<()> {
        let previous = if self.wants_previous {
            self.value.read().clone()
        } else {
            None
        };

        let outcome = self
            .runtime
            .evaluate(self.id, || (self.compute)(previous.as_ref()));
        self.runs.fetch_add(1, Ordering::SeqCst);

        match outcome {
            Ok(new_value) => {
                // Check if value actually changed
                let changed = self.value.read().as_ref() != Some(&new_value);
                *self.value.write() = Some(new_value);

                self.runtime.with_graph(|g| {
                    if changed {
                        g.scheduler.bump_version(self.id);
                    }
                    // An input written during the computation leaves the
                    // result already out of date
                    if g.scheduler.has_stale_dependencies(self.id) {
                        g.scheduler.mark_dirty(self.id);
                    } else {
                        g.scheduler.mark_clean(self.id);
                    }
                });
                Ok(())
            }
            Err(source) => {
                *self.value.write() = None;
                self.runtime.with_graph(|g| g.scheduler.mark_dirty(self.id));
                Err(ReactiveError::computation(self.id, source))
            }
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.runtime.remove_node(self.id);
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync + PartialEq.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (some memos might return the same value even if inputs changed).
///
/// A memo has no `set`: its value only ever comes from its computation.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Memo, Runtime, Signal};
///
/// let runtime = Runtime::new();
/// let count = Signal::new(&runtime, 2);
///
/// let source = count.clone();
/// let doubled = Memo::new(&runtime, move || source.get() * 2);
/// assert_eq!(doubled.get(), 4);
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    ///
    /// A computation that cannot fail has no way to return an error from a
    /// nested read, so a cycle (`x` computed from `x.get()`) panics inside
    /// the computation. Use [`try_new`](Memo::try_new) with nested
    /// [`try_get`](Memo::try_get) calls to get
    /// [`ReactiveError::CyclicDependency`] back instead.
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::try_new(runtime, move || Ok::<T, BoxError>(compute()))
    }

    /// Create a memo whose computation may fail.
    ///
    /// Errors reach the caller of [`try_get`](Memo::try_get) as
    /// [`ReactiveError::ComputationFailure`]. Reactive errors returned from
    /// nested reads (a detected cycle, say) pass through unchanged.
    pub fn try_new<F, E>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError> + 'static,
    {
        let compute: ComputeFn<T> =
            Box::new(move |_: Option<&T>| -> std::result::Result<T, BoxError> {
                compute().map_err(Into::into)
            });
        Self {
            inner: ComputedInner::create(runtime, NodeKind::Derived, false, compute),
        }
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id()
    }

    /// The runtime this memo belongs to.
    pub fn runtime(&self) -> &Runtime {
        self.inner.runtime()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the computation fails or depends on itself. Use
    /// [`try_get`](Memo::try_get) to handle those cases; a cycle only reaches
    /// the caller as an error when every read along it uses `try_get`.
    pub fn get(&self) -> T {
        match self.inner.try_get() {
            Ok(value) => value,
            Err(err) => panic!("failed to read memo {}: {err}", self.id()),
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value.
    pub fn try_get(&self) -> Result<T> {
        self.inner.try_get()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        self.inner.get_untracked()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        self.inner.state()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.has_value()
    }

    /// Number of times the computation has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count()
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        self.inner.dependent_count()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn memo_computes_on_first_access() {
        let runtime = Runtime::new();
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(&runtime, move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        // Not computed yet
        assert!(!memo.has_value());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        // First access triggers computation
        let value = memo.get();
        assert_eq!(value, 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(memo.has_value());
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let runtime = Runtime::new();
        let memo = Memo::new(&runtime, || 42);

        // First access
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.run_count(), 1);

        // Later accesses should use cache
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.run_count(), 1);
    }

    #[test]
    fn memo_recomputes_when_dependency_changes() {
        let runtime = Runtime::new();
        let counter = Signal::new(&runtime, 0);

        let counter_clone = counter.clone();
        let memo = Memo::new(&runtime, move || counter_clone.get());

        assert_eq!(memo.get(), 0);
        assert_eq!(memo.state(), DirtyState::Clean);

        counter.set(5);
        assert_eq!(memo.state(), DirtyState::Dirty);

        assert_eq!(memo.get(), 5);
        assert_eq!(memo.run_count(), 2);
    }

    #[test]
    fn memo_state_transitions() {
        let runtime = Runtime::new();
        let base = Signal::new(&runtime, 1);

        let base_clone = base.clone();
        let inner = Memo::new(&runtime, move || base_clone.get() % 2);
        let inner_clone = inner.clone();
        let outer = Memo::new(&runtime, move || inner_clone.get() * 10);

        // Starts dirty
        assert_eq!(outer.state(), DirtyState::Dirty);

        // After get, becomes clean
        assert_eq!(outer.get(), 10);
        assert_eq!(outer.state(), DirtyState::Clean);

        // A change two hops away only makes it maybe dirty
        base.set(3);
        assert_eq!(inner.state(), DirtyState::Dirty);
        assert_eq!(outer.state(), DirtyState::MaybeDirty);

        // The inner memo recomputes to the same value, so the outer one does not
        assert_eq!(outer.get(), 10);
        assert_eq!(inner.run_count(), 2);
        assert_eq!(outer.run_count(), 1);
        assert_eq!(outer.state(), DirtyState::Clean);
    }

    #[test]
    fn failed_computation_is_retried() {
        let runtime = Runtime::new();
        let divisor = Signal::new(&runtime, 0);

        let divisor_clone = divisor.clone();
        let memo = Memo::try_new(&runtime, move || match divisor_clone.get() {
            0 => Err("division by zero"),
            d => Ok(100 / d),
        });

        let err = memo.try_get().unwrap_err();
        assert!(matches!(err, ReactiveError::ComputationFailure { .. }));
        assert!(!memo.has_value());

        // Nothing changed, but a failed run is never cached
        assert!(memo.try_get().is_err());
        assert_eq!(memo.run_count(), 2);

        divisor.set(4);
        assert_eq!(memo.try_get().unwrap(), 25);
    }

    #[test]
    fn failed_input_is_seen_by_reader() {
        let runtime = Runtime::new();
        let source = Signal::new(&runtime, 1);

        let source_clone = source.clone();
        let checked = Memo::try_new(&runtime, move || match source_clone.get() {
            0 => Err("zero"),
            v => Ok(v),
        });
        let checked_clone = checked.clone();
        let fallback = Memo::new(&runtime, move || checked_clone.try_get().unwrap_or(-1));
        assert_eq!(fallback.try_get().unwrap(), 1);

        // The reader handles the failure itself
        source.set(0);
        assert_eq!(fallback.try_get().unwrap(), -1);
        assert!(checked.try_get().is_err());

        source.set(2);
        assert_eq!(fallback.get(), 2);
    }

    #[test]
    fn writing_an_input_during_computation_stays_dirty() {
        let runtime = Runtime::new();
        let source = Signal::new(&runtime, 1);

        let source_clone = source.clone();
        let memo = Memo::new(&runtime, move || {
            let value = source_clone.get();
            if value < 3 {
                source_clone.set(value + 1);
            }
            value
        });

        assert_eq!(memo.get(), 1);
        assert_eq!(source.get_untracked(), 2);
        assert_eq!(memo.state(), DirtyState::Dirty);

        assert_eq!(memo.get(), 2);
        assert_eq!(memo.get(), 3);
        assert_eq!(memo.state(), DirtyState::Clean);
        assert_eq!(memo.get(), 3);
        assert_eq!(memo.run_count(), 3);
    }

    #[test]
    fn memo_clone_shares_state() {
        let runtime = Runtime::new();
        let memo1 = Memo::new(&runtime, || 42);

        // Force computation
        assert_eq!(memo1.get(), 42);

        let memo2 = memo1.clone();

        // Clone should have same ID and share state
        assert_eq!(memo1.id(), memo2.id());
        assert!(memo2.has_value());
        assert_eq!(memo2.get(), 42);
        assert_eq!(memo2.run_count(), 1);
    }

    #[test]
    fn dropping_memo_removes_node() {
        let runtime = Runtime::new();
        let memo = Memo::new(&runtime, || 1);
        assert_eq!(runtime.node_count(), 1);

        drop(memo);
        assert_eq!(runtime.node_count(), 0);
    }
}
