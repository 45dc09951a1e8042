//! Stream Interop
//!
//! Adapters between reactive cells and push-based async streams.
//!
//! - [`to_stream`] observes a cell through an effect and forwards every new
//!   value into a [`CellStream`].
//! - [`from_stream`] creates a signal that is written whenever a stream
//!   yields a value.
//!
//! Effects run on whichever thread writes a signal, so values are handed to
//! the async side through an unbounded channel and never block the writer.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::reactive::{Effect, LinkedSignal, Memo, Runtime, Signal};

/// A reactive cell whose value can be observed from outside the graph.
pub trait Readable: Clone + Send + Sync + 'static {
    type Value: Clone + Send + 'static;

    /// Read the current value, tracking the read like `get` does.
    fn try_read(&self) -> Result<Self::Value>;

    /// The runtime the cell belongs to.
    fn runtime(&self) -> &Runtime;
}

impl<T> Readable for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Value = T;

    fn try_read(&self) -> Result<T> {
        Ok(self.get())
    }

    fn runtime(&self) -> &Runtime {
        Signal::runtime(self)
    }
}

impl<T> Readable for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    type Value = T;

    fn try_read(&self) -> Result<T> {
        self.try_get()
    }

    fn runtime(&self) -> &Runtime {
        Memo::runtime(self)
    }
}

impl<T> Readable for LinkedSignal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    type Value = T;

    fn try_read(&self) -> Result<T> {
        self.try_get()
    }

    fn runtime(&self) -> &Runtime {
        LinkedSignal::runtime(self)
    }
}

/// Stream of the values of a reactive cell.
///
/// Yields the value the cell held when the stream was created, then every
/// value it changes to. Memos and linked signals only yield when their value
/// actually changed. Dropping the stream disposes the observing effect.
pub struct CellStream<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    effect: Effect,
}

impl<T> CellStream<T> {
    /// The effect feeding this stream.
    pub fn effect(&self) -> &Effect {
        &self.effect
    }
}

impl<T> Stream for CellStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver.poll_recv(cx)
    }
}

impl<T> Drop for CellStream<T> {
    fn drop(&mut self) {
        self.effect.dispose();
    }
}

impl<T> fmt::Debug for CellStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellStream")
            .field("effect", &self.effect)
            .finish_non_exhaustive()
    }
}

/// Observe a cell as a stream.
///
/// A failed read (a memo whose computation errors) is reported to the
/// runtime's error handler and yields nothing.
pub fn to_stream<C>(cell: &C) -> CellStream<C::Value>
where
    C: Readable,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    let source = cell.clone();

    let effect = Effect::try_new(cell.runtime(), move |_| {
        let value = source.try_read()?;
        // A closed receiver means the stream is being dropped
        let _ = sender.send(value);
        Ok::<(), crate::error::ReactiveError>(())
    });

    CellStream { receiver, effect }
}

/// Create a signal fed by a stream.
///
/// The signal starts out holding `initial`. The returned future writes every
/// value the stream yields into it and completes when the stream ends; it
/// does nothing until polled.
pub fn from_stream<T, S>(
    runtime: &Runtime,
    initial: T,
    stream: S,
) -> (Signal<T>, impl Future<Output = ()> + Send + 'static)
where
    T: Clone + Send + Sync + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    let signal = Signal::new(runtime, initial);
    let target = signal.clone();

    let driver = async move {
        stream
            .for_each(move |value| {
                target.set(value);
                futures_util::future::ready(())
            })
            .await;
        tracing::debug!("source stream ended");
    };

    (signal, driver)
}

/// Like [`from_stream`], with the driving future spawned on the current tokio
/// runtime.
///
/// # Panics
///
/// Panics when called outside of a tokio runtime.
pub fn spawn_from_stream<T, S>(
    runtime: &Runtime,
    initial: T,
    stream: S,
) -> (Signal<T>, JoinHandle<()>)
where
    T: Clone + Send + Sync + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    let (signal, driver) = from_stream(runtime, initial, stream);
    (signal, tokio::spawn(driver))
}
