//! Linked Signals
//!
//! A linked signal is derived from other reactive values like a memo, but can
//! also be written like a signal.
//!
//! # Reconciliation
//!
//! - `set` replaces the value and counts as a change for dependents. Any
//!   source change that happened before the write is absorbed by it, so the
//!   override is never clobbered right away.
//! - The override lasts until one of the tracked sources changes again. The
//!   computation then re-runs and its result becomes the value, even if it is
//!   the same result the cell held before the override.

use std::fmt::Debug;
use std::sync::Arc;

use super::memo::ComputedInner;
use super::runtime::Runtime;
use crate::error::{BoxError, Result};
use crate::graph::{DirtyState, NodeId, NodeKind};

/// A derived value that can be overridden until its sources change.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{LinkedSignal, Runtime, Signal};
///
/// let runtime = Runtime::new();
/// let options = Signal::new(&runtime, vec!["apple", "banana"]);
///
/// let source = options.clone();
/// let selected = LinkedSignal::new(&runtime, move || source.get()[0]);
/// assert_eq!(selected.get(), "apple");
///
/// selected.set("banana");
/// assert_eq!(selected.get(), "banana");
///
/// // A new list of options resets the selection
/// options.set(vec!["cherry"]);
/// assert_eq!(selected.get(), "cherry");
/// ```
pub struct LinkedSignal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> LinkedSignal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a linked signal from a computation over other reactive values.
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_previous(runtime, move |_| compute())
    }

    /// Create a linked signal whose computation also receives the value the
    /// cell held before, computed or written. `None` on the first run.
    pub fn with_previous<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn(Option<&T>) -> T + Send + Sync + 'static,
    {
        let inner = ComputedInner::create(
            runtime,
            NodeKind::Linked,
            true,
            Box::new(move |previous: Option<&T>| -> std::result::Result<T, BoxError> {
                Ok(compute(previous))
            }),
        );
        Self { inner }
    }

    /// Get the linked signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id()
    }

    /// The runtime this linked signal belongs to.
    pub fn runtime(&self) -> &Runtime {
        self.inner.runtime()
    }

    /// Get the current value, recomputing if a source changed.
    ///
    /// # Panics
    ///
    /// Panics if the computation depends on itself.
    pub fn get(&self) -> T {
        match self.inner.try_get() {
            Ok(value) => value,
            Err(err) => panic!("failed to read linked signal {}: {err}", self.id()),
        }
    }

    /// Get the current value, recomputing if a source changed.
    pub fn try_get(&self) -> Result<T> {
        self.inner.try_get()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        self.inner.get_untracked()
    }

    /// Override the value until the next source change.
    pub fn set(&self, value: T) {
        self.inner.override_value(value);
    }

    /// Override the value with a function of the current one.
    ///
    /// The current value is read untracked. If it cannot be computed, the
    /// function is not called.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let _exec = self.inner.runtime().exec();
        match self.get_untracked() {
            Ok(current) => self.set(f(&current)),
            Err(err) => tracing::debug!(node = %self.id(), error = %err, "update skipped"),
        }
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        self.inner.state()
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

impl<T> Clone for LinkedSignal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for LinkedSignal<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedSignal")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}
