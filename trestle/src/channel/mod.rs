//! Bounded, backpressured channels over push-based transports.
//!
//! A [`ReceiveChannel`] wraps a [`PushSource`] and a [`SendChannel`] wraps
//! a [`PushSink`]; a [`Channel`] composes both over the same transport.
//! Receiving and sending suspend the calling task instead of blocking, and
//! the task always resumes on its own execution context.
//!
//! Flow control works in both directions:
//! - a receive channel pauses its source once `capacity` values are
//!   buffered and resumes it when receives drain the buffer down to the
//!   low-water mark,
//! - a send channel suspends the sender while the sink refuses writes and
//!   retries once the sink reports it drained.
//!
//! [`memory`] provides in-memory transports.

pub mod memory;

mod receive;
mod send;
mod sink;
mod source;

pub use receive::{ReceiveChannel, ReceiveFuture};
pub use send::{SendChannel, SendFuture};
pub use sink::{DrainCallback, PushSink};
pub use source::{PushSource, SourceHandlers};

use crate::error::Cause;

use std::sync::Arc;
use std::task::Waker;

/// Terminal state of a channel half.
///
/// Once a channel leaves `Open` it never goes back.
#[derive(Debug, Clone)]
pub(crate) enum Terminal {
    Open,

    /// The source reported the end of the stream.
    Ended,

    /// The transport failed; reported to every later operation.
    Failed(Cause),

    /// Closed by the channel owner.
    Closed,
}

impl Terminal {
    pub(crate) fn is_open(&self) -> bool {
        matches!(self, Terminal::Open)
    }
}

/// The task allowed to wait on a channel half.
///
/// The slot stays taken from the first `Pending` until the waiting future
/// completes or is dropped, so a woken but not yet re-polled waiter still
/// excludes others.
pub(crate) struct Waiter {
    pub(crate) id: u64,
    pub(crate) waker: Option<Waker>,
}

/// Default channel bound.
const DEFAULT_CAPACITY: usize = 16;

/// Configures and creates channels.
///
/// The low-water mark defaults to half the capacity.
///
/// # Examples
///
/// ```rust,ignore
/// let channel = ChannelBuilder::new()
///     .capacity(4)
///     .receive(source);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ChannelBuilder {
    capacity: usize,
    low_water: Option<usize>,
}

impl ChannelBuilder {
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            low_water: None,
        }
    }

    /// Sets the number of buffered values at which the source is paused.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "channel capacity must be > 0");

        self.capacity = n;
        self
    }

    /// Sets the number of buffered values at or below which a paused
    /// source is resumed. Clamped below the capacity.
    pub fn low_water(mut self, n: usize) -> Self {
        self.low_water = Some(n);
        self
    }

    /// Wraps `source` into a receive channel.
    pub fn receive<T, S>(self, source: S) -> ReceiveChannel<T>
    where
        T: Send + 'static,
        S: PushSource<T> + 'static,
    {
        ReceiveChannel::new(Arc::new(source), self.capacity, self.resolved_low_water(), None)
    }

    /// Wraps `sink` into a send channel.
    pub fn send<T, K>(self, sink: K) -> SendChannel<T>
    where
        T: Send + 'static,
        K: PushSink<T> + 'static,
    {
        SendChannel::new(Arc::new(sink))
    }

    /// Wraps the two ends of one transport into a duplex channel.
    pub fn duplex<T, S, K>(self, source: S, sink: K) -> Channel<T>
    where
        T: Send + 'static,
        S: PushSource<T> + 'static,
        K: PushSink<T> + 'static,
    {
        let sender = self.send(sink);
        let receiver = ReceiveChannel::new(
            Arc::new(source),
            self.capacity,
            self.resolved_low_water(),
            Some(Arc::downgrade(&sender.shared)),
        );

        Channel { receiver, sender }
    }

    fn resolved_low_water(&self) -> usize {
        self.low_water
            .unwrap_or(self.capacity / 2)
            .min(self.capacity - 1)
    }
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bidirectional channel over one transport.
///
/// A failure of the source also fails the send side.
pub struct Channel<T> {
    receiver: ReceiveChannel<T>,
    sender: SendChannel<T>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<T: Send + 'static> Channel<T> {
    /// See [`ReceiveChannel::receive`].
    pub fn receive(&self) -> ReceiveFuture<'_, T> {
        self.receiver.receive()
    }

    /// See [`SendChannel::send`].
    pub fn send(&self, value: T) -> SendFuture<'_, T> {
        self.sender.send(value)
    }

    /// Closes both halves.
    pub fn close(&self) {
        self.receiver.close();
        self.sender.close();
    }

    pub fn receiver(&self) -> &ReceiveChannel<T> {
        &self.receiver
    }

    pub fn sender(&self) -> &SendChannel<T> {
        &self.sender
    }

    /// Splits the channel into its halves.
    pub fn split(self) -> (ReceiveChannel<T>, SendChannel<T>) {
        (self.receiver, self.sender)
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("receiver", &self.receiver)
            .field("sender", &self.sender)
            .finish()
    }
}
