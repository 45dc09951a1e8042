//! Effect Scopes
//!
//! A scope owns a group of effects and disposes all of them at once, when
//! [`Scope::dispose`] is called or when the scope is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::effect::{Effect, EffectContext};
use super::runtime::Runtime;
use crate::error::BoxError;

type ScopeCleanupFn = Box<dyn FnOnce() + Send>;

/// Owner of a set of effects.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Runtime, Scope, Signal};
///
/// let runtime = Runtime::new();
/// let count = Signal::new(&runtime, 0);
///
/// let scope = Scope::new(&runtime);
/// let watched = count.clone();
/// let effect = scope.effect(move |_| {
///     watched.get();
/// });
///
/// drop(scope);
/// assert!(effect.is_disposed());
/// ```
pub struct Scope {
    runtime: Runtime,
    effects: Mutex<Vec<Effect>>,
    cleanups: Mutex<Vec<ScopeCleanupFn>>,
    disposed: AtomicBool,
}

impl Scope {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            effects: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Create an effect owned by this scope.
    ///
    /// On a disposed scope the effect is created already disposed and never
    /// runs.
    pub fn effect<F>(&self, mut run: F) -> Effect
    where
        F: FnMut(&EffectContext) + Send + 'static,
    {
        self.try_effect(move |cx| {
            run(cx);
            Ok::<(), BoxError>(())
        })
    }

    /// Create a fallible effect owned by this scope.
    pub fn try_effect<F, E>(&self, run: F) -> Effect
    where
        F: FnMut(&EffectContext) -> Result<(), E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let effect = Effect::new_lazy(&self.runtime, run);
        if self.is_disposed() {
            effect.dispose();
            return effect;
        }

        self.effects.lock().push(effect.clone());
        effect.schedule();
        effect
    }

    /// Register a callback to run when the scope is disposed, after its
    /// effects.
    pub fn on_dispose<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_disposed() {
            cleanup();
        } else {
            self.cleanups.lock().push(Box::new(cleanup));
        }
    }

    /// Dispose every effect in the scope, in creation order, then run the
    /// scope's own cleanups. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let effects = std::mem::take(&mut *self.effects.lock());
        let count = effects.len();
        for effect in effects {
            effect.dispose();
        }

        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        for cleanup in cleanups {
            cleanup();
        }

        debug!(effects = count, "scope disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Number of effects the scope currently owns.
    pub fn effect_count(&self) -> usize {
        self.effects.lock().len()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("effect_count", &self.effect_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
