//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal registers that context as a dependent.
//!
//! 2. When a signal's value changes, its version is bumped and all
//!    dependents are marked stale.
//!
//! 3. Stale effects re-run once the write (or the enclosing batch) is done.
//!    Stale memos wait until somebody reads them.
//!
//! # Equal writes
//!
//! Every `set` counts as a change, even when the new value equals the old
//! one. Memos downstream compare their own results, so an equal write stops
//! propagating at the first memo whose output did not change.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::Runtime;
use crate::graph::{NodeId, NodeKind};

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. Must be Clone + Send + Sync.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Runtime, Signal};
///
/// let runtime = Runtime::new();
/// let count = Signal::new(&runtime, 0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies dependents)
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T> {
    /// Unique identifier for this signal.
    id: NodeId,

    runtime: Runtime,

    /// The current value.
    value: RwLock<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        self.runtime.remove_node(self.id);
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: runtime.register_node(NodeKind::Source),
                runtime: runtime.clone(),
                value: RwLock::new(value),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// The runtime this signal belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a dependent.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Borrow the current value, tracking the read like [`get`](Signal::get).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _exec = self.inner.runtime.exec();
        self.inner.runtime.track_read(self.inner.id);
        let value = self.inner.value.read();
        f(&value)
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Use this when you need to read the value without establishing
    /// a reactive dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value without tracking dependencies.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Set a new value and notify dependents.
    ///
    /// Dependent effects re-run before this returns, unless a batch is open.
    pub fn set(&self, value: T) {
        let _exec = self.inner.runtime.exec();
        *self.inner.value.write() = value;
        self.inner.runtime.notify_changed(self.inner.id);
    }

    /// Update the value using a function of the current value.
    ///
    /// The current value is read untracked.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let _exec = self.inner.runtime.exec();
        let new_value = self.with_untracked(f);
        self.set(new_value);
    }

    /// Current version. Bumped by every write.
    pub fn version(&self) -> u64 {
        self.inner.runtime.version(self.inner.id)
    }

    /// Get the number of computations that read this signal last time they
    /// ran.
    pub fn dependent_count(&self) -> usize {
        self.inner.runtime.dependent_count(self.inner.id)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
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
    use crate::reactive::Effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_with_borrows() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, vec![1, 2, 3]);
        assert_eq!(signal.with(|v| v.len()), 3);
        assert_eq!(signal.with_untracked(|v| v[2]), 3);
    }

    #[test]
    fn every_write_bumps_version() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 1);
        assert_eq!(signal.version(), 0);

        signal.set(2);
        signal.set(2);
        assert_eq!(signal.version(), 2);
    }

    #[test]
    fn signal_notifies_dependents() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 0);
        let call_count = Arc::new(AtomicI32::new(0));

        let call_count_clone = call_count.clone();
        let signal_clone = signal.clone();
        let _effect = Effect::new(&runtime, move |_| {
            signal_clone.get();
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.dependent_count(), 1);

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        signal.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let runtime = Runtime::new();
        let signal = Signal::new(&runtime, 0);
        let call_count = Arc::new(AtomicI32::new(0));

        let call_count_clone = call_count.clone();
        let signal_clone = signal.clone();
        let _effect = Effect::new(&runtime, move |_| {
            signal_clone.get_untracked();
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.dependent_count(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let runtime = Runtime::new();
        let signal1 = Signal::new(&runtime, 0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn dropping_last_handle_removes_node() {
        let runtime = Runtime::new();
        let s1 = Signal::new(&runtime, 0);
        let s2 = s1.clone();
        assert_eq!(runtime.node_count(), 1);

        drop(s1);
        assert_eq!(runtime.node_count(), 1);
        drop(s2);
        assert_eq!(runtime.node_count(), 0);
    }

    #[test]
    fn signal_ids_are_unique() {
        let runtime = Runtime::new();
        let s1 = Signal::new(&runtime, 0);
        let s2 = Signal::new(&runtime, 0);
        let s3 = Signal::new(&runtime, 0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }
}
