use super::sink::PushSink;
use super::{Terminal, Waiter};
use crate::error::{BridgeError, Cause};

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tracing::{debug, error, trace};

struct SendState {
    terminal: Terminal,

    /// The single sender allowed to wait for a drain.
    waiter: Option<Waiter>,
}

impl SendState {
    /// The error reported to senders once the channel is terminal.
    fn terminal_error(&self) -> Option<BridgeError> {
        match &self.terminal {
            Terminal::Open => None,
            Terminal::Ended | Terminal::Closed => Some(BridgeError::ChannelClosed),
            Terminal::Failed(cause) => Some(BridgeError::Operation(cause.clone())),
        }
    }
}

pub(crate) struct SendShared<T> {
    state: Mutex<SendState>,
    sink: Arc<dyn PushSink<T>>,
    next_waiter: AtomicU64,
}

impl<T> SendShared<T> {
    /// Wakes the waiting sender after a drain notification.
    fn drained(&self) {
        let waker = self
            .state
            .lock()
            .waiter
            .as_mut()
            .and_then(|w| w.waker.take());

        if let Some(waker) = waker {
            trace!("sink drained, resuming sender");
            waker.wake();
        }
    }

    /// Fails the channel with a sticky cause.
    pub(crate) fn fail(&self, cause: Cause) {
        let waker = {
            let mut state = self.state.lock();

            if !state.terminal.is_open() {
                return;
            }

            debug!("send channel failed");
            state.terminal = Terminal::Failed(cause);
            state.waiter.as_mut().and_then(|w| w.waker.take())
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn close(&self) {
        let waker = {
            let mut state = self.state.lock();

            if !state.terminal.is_open() {
                return;
            }

            debug!("send channel closed");
            state.terminal = Terminal::Closed;
            state.waiter.as_mut().and_then(|w| w.waker.take())
        };

        self.sink.close();

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Clears the waiter slot if `id` holds it.
    fn release(&self, id: u64) {
        let mut state = self.state.lock();

        if state.waiter.as_ref().is_some_and(|w| w.id == id) {
            state.waiter = None;
        }
    }
}

impl<T> Drop for SendShared<T> {
    fn drop(&mut self) {
        if self.state.get_mut().terminal.is_open() {
            self.sink.close();
        }
    }
}

/// The sending half of a channel, wrapping a [`PushSink`].
///
/// A send completes as soon as the sink accepts the value. When the sink
/// is saturated the sending task suspends until the sink drains, then the
/// write is retried.
///
/// Handles are cheap to clone. Only one task may wait in
/// [`send`](Self::send) at a time. Dropping the last handle closes the
/// sink.
pub struct SendChannel<T> {
    pub(crate) shared: Arc<SendShared<T>>,
}

impl<T> Clone for SendChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> SendChannel<T> {
    pub(crate) fn new(sink: Arc<dyn PushSink<T>>) -> Self {
        Self {
            shared: Arc::new(SendShared {
                state: Mutex::new(SendState {
                    terminal: Terminal::Open,
                    waiter: None,
                }),
                sink,
                next_waiter: AtomicU64::new(0),
            }),
        }
    }

    /// Sends `value` through the sink.
    ///
    /// Resolves to:
    /// - `Ok(())` once the sink accepted the value,
    /// - `Err(BridgeError::ChannelClosed)` if the channel is closed,
    /// - `Err(BridgeError::Operation(_))` if the channel failed,
    /// - `Err(BridgeError::ConcurrentSend)` if another task is already
    ///   waiting on this channel.
    ///
    /// The value is dropped when the send fails.
    pub fn send(&self, value: T) -> SendFuture<'_, T> {
        SendFuture {
            channel: self,
            value: Some(value),
            id: self.shared.next_waiter.fetch_add(1, Ordering::Relaxed),
            done: false,
        }
    }

    /// Closes the channel and its sink.
    ///
    /// A waiting sender resumes with [`BridgeError::ChannelClosed`].
    /// Closing again does nothing.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns `true` once the channel was closed or failed.
    pub fn is_closed(&self) -> bool {
        !self.shared.state.lock().terminal.is_open()
    }
}

impl<T> fmt::Debug for SendChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();

        f.debug_struct("SendChannel")
            .field("terminal", &state.terminal)
            .field("waiting", &state.waiter.is_some())
            .finish()
    }
}

/// Future returned by [`SendChannel::send`].
#[must_use = "futures do nothing unless awaited"]
pub struct SendFuture<'a, T> {
    channel: &'a SendChannel<T>,
    value: Option<T>,
    id: u64,
    done: bool,
}

// The pending value is moved out, never pinned.
impl<T> Unpin for SendFuture<'_, T> {}

impl<T> SendFuture<'_, T> {
    fn finish(&mut self, outcome: Result<(), BridgeError>) -> Poll<Result<(), BridgeError>> {
        self.done = true;
        self.value = None;
        self.channel.shared.release(self.id);
        Poll::Ready(outcome)
    }
}

impl<T: Send + 'static> Future for SendFuture<'_, T> {
    type Output = Result<(), BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let shared = this.channel.shared.clone();

        assert!(!this.done, "SendFuture polled after completion");

        {
            let state = shared.state.lock();

            if state.waiter.as_ref().is_some_and(|w| w.id != this.id) {
                drop(state);
                error!("concurrent send on the same channel");
                this.done = true;
                this.value = None;
                return Poll::Ready(Err(BridgeError::ConcurrentSend));
            }

            if let Some(err) = state.terminal_error() {
                drop(state);
                return this.finish(Err(err));
            }
        }

        let Some(value) = this.value.take() else {
            return this.finish(Ok(()));
        };

        let value = match shared.sink.write(value) {
            Ok(()) => return this.finish(Ok(())),
            Err(value) => value,
        };

        {
            let mut state = shared.state.lock();

            if let Some(err) = state.terminal_error() {
                drop(state);
                return this.finish(Err(err));
            }

            state.waiter = Some(Waiter {
                id: this.id,
                waker: Some(cx.waker().clone()),
            });
        }

        let drained = Arc::downgrade(&shared);
        shared.sink.on_drain(Box::new(move || {
            if let Some(shared) = drained.upgrade() {
                shared.drained();
            }
        }));

        // The sink may have drained before the callback was installed.
        match shared.sink.write(value) {
            Ok(()) => this.finish(Ok(())),
            Err(value) => {
                trace!("sink saturated, suspending sender");
                this.value = Some(value);
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for SendFuture<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            self.channel.shared.release(self.id);
        }
    }
}
