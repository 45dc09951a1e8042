//! Ripple Core
//!
//! This crate provides a small fine-grained reactive runtime. It implements:
//!
//! - Reactive primitives (signals, memos, linked signals, effects)
//! - Glitch-free incremental propagation with batching
//! - Cycle detection and error reporting
//! - Adapters to and from async streams
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `graph`: Dependency graph, dirty states and the pending-effect queue
//! - `interop`: Stream adapters built on tokio and futures
//! - `config`: Runtime configuration
//! - `error`: Error types shared by the whole crate
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{Effect, Memo, Runtime, Signal};
//!
//! let runtime = Runtime::new();
//!
//! // Create a signal
//! let count = Signal::new(&runtime, 0);
//!
//! // Create a derived value
//! let source = count.clone();
//! let doubled = Memo::new(&runtime, move || source.get() * 2);
//!
//! // Create an effect
//! let (watched, derived) = (count.clone(), doubled.clone());
//! let _effect = Effect::new(&runtime, move |_| {
//!     println!("Count: {}, Doubled: {}", watched.get(), derived.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod interop;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{BoxError, ReactiveError, Result};
