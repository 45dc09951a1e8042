//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, linked
//! signals and effects, all living in a [`Runtime`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes, and only when somebody reads it.
//!
//! ## Linked Signals
//!
//! A LinkedSignal is a memo that can also be written. A write holds until
//! the next change of one of its sources.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems.
//! A [`Scope`] disposes a group of effects together.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically: each runtime keeps a stack of
//! evaluation frames, and every read made while a frame is on top is recorded
//! for that frame's node. [`Runtime::untracked`] pushes a frame that records
//! nothing.
//!
//! Updates are glitch-free. A write only marks nodes stale; values are pulled
//! afterwards, inputs first, so no computation ever sees a mix of old and new
//! values.

mod context;
mod effect;
mod linked;
mod memo;
mod runtime;
mod scope;
mod signal;

pub use context::ReactiveContext;
pub use effect::{Effect, EffectContext};
pub use linked::LinkedSignal;
pub use memo::Memo;
pub use runtime::{BatchGuard, Runtime};
pub use scope::Scope;
pub use signal::Signal;
