use super::send::SendShared;
use super::source::{PushSource, SourceHandlers};
use super::{Terminal, Waiter};
use crate::bridge::Subscription;
use crate::error::{BridgeError, Cause};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tracing::{debug, error, trace, warn};

struct ReceiveState<T> {
    /// Values delivered by the source and not yet received.
    buffer: VecDeque<T>,

    terminal: Terminal,

    /// The single receiver allowed to wait.
    waiter: Option<Waiter>,

    /// Whether the source was asked to pause.
    paused: bool,

    /// Set once the advisory bound was exceeded and reported.
    overflow_reported: bool,

    /// Registration with the source, cancelled on termination.
    subscription: Option<Subscription>,

    /// Send side of the same transport, failed along with the source.
    peer: Option<Weak<SendShared<T>>>,
}

pub(crate) struct ReceiveShared<T> {
    state: Mutex<ReceiveState<T>>,
    source: Arc<dyn PushSource<T>>,
    capacity: usize,
    low_water: usize,
    next_waiter: AtomicU64,
}

impl<T: Send + 'static> ReceiveShared<T> {
    /// Buffers a value delivered by the source.
    fn push(&self, value: T) {
        let (waker, pause) = {
            let mut state = self.state.lock();

            if !state.terminal.is_open() {
                trace!("dropping value delivered after termination");
                return;
            }

            state.buffer.push_back(value);
            let len = state.buffer.len();

            if len > self.capacity && !state.overflow_reported {
                state.overflow_reported = true;
                warn!(
                    len,
                    capacity = self.capacity,
                    "source ignores backpressure, buffering past the channel bound"
                );
            }

            let pause = len >= self.capacity && !state.paused;
            if pause {
                state.paused = true;
            }

            (state.waiter.as_mut().and_then(|w| w.waker.take()), pause)
        };

        if let Some(waker) = waker {
            waker.wake();
        }

        if pause {
            trace!(capacity = self.capacity, "pausing source");
            self.apply_flow(true);
        }
    }

    /// Forwards a flow change to the source.
    ///
    /// `pause` and `resume` run outside the state lock, so calls made from
    /// different threads may reach the source out of order. After each call
    /// the flag is read again and the call repeated until the source was last
    /// told what the channel currently wants.
    fn apply_flow(&self, mut paused: bool) {
        loop {
            if paused {
                self.source.pause();
            } else {
                self.source.resume();
            }

            let wanted = self.state.lock().paused;
            if wanted == paused {
                return;
            }

            trace!(paused = wanted, "source flow changed meanwhile, reapplying");
            paused = wanted;
        }
    }

    /// Moves the channel to a terminal state reported by the source.
    fn terminate(&self, terminal: Terminal) {
        let (subscription, waker, peer) = {
            let mut state = self.state.lock();

            if !state.terminal.is_open() {
                return;
            }

            debug!(?terminal, "receive channel terminated by its source");
            state.terminal = terminal.clone();

            (
                state.subscription.take(),
                state.waiter.as_mut().and_then(|w| w.waker.take()),
                state.peer.take(),
            )
        };

        if let Some(mut subscription) = subscription {
            subscription.cancel();
        }

        if let Terminal::Failed(cause) = terminal {
            if let Some(peer) = peer.and_then(|peer| peer.upgrade()) {
                peer.fail(cause);
            }
        }

        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<T> Drop for ReceiveShared<T> {
    fn drop(&mut self) {
        if let Some(mut subscription) = self.state.get_mut().subscription.take() {
            subscription.cancel();
        }
    }
}

/// The receiving half of a channel, wrapping a [`PushSource`].
///
/// Values pushed by the source are buffered up to the channel bound; the
/// source is paused when the bound is reached and resumed once receives
/// drain the buffer to the low-water mark.
///
/// Handles are cheap to clone and share the same buffer. Only one task may
/// wait in [`receive`](Self::receive) at a time. Dropping the last handle
/// closes the channel.
pub struct ReceiveChannel<T> {
    shared: Arc<ReceiveShared<T>>,
}

impl<T> Clone for ReceiveChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> ReceiveChannel<T> {
    pub(crate) fn new(
        source: Arc<dyn PushSource<T>>,
        capacity: usize,
        low_water: usize,
        peer: Option<Weak<SendShared<T>>>,
    ) -> Self {
        let shared = Arc::new(ReceiveShared {
            state: Mutex::new(ReceiveState {
                buffer: VecDeque::with_capacity(capacity),
                terminal: Terminal::Open,
                waiter: None,
                paused: false,
                overflow_reported: false,
                subscription: None,
                peer,
            }),
            source: source.clone(),
            capacity,
            low_water,
            next_waiter: AtomicU64::new(0),
        });

        let on_value = Arc::downgrade(&shared);
        let on_end = Arc::downgrade(&shared);
        let on_failure = Arc::downgrade(&shared);

        let handlers = SourceHandlers::new(
            move |value| {
                if let Some(shared) = on_value.upgrade() {
                    shared.push(value);
                }
            },
            move || {
                if let Some(shared) = on_end.upgrade() {
                    shared.terminate(Terminal::Ended);
                }
            },
            move |cause: Cause| {
                if let Some(shared) = on_failure.upgrade() {
                    shared.terminate(Terminal::Failed(cause));
                }
            },
        );

        let mut subscription = source.subscribe(handlers);

        let mut state = shared.state.lock();
        if state.terminal.is_open() {
            state.subscription = Some(subscription);
            drop(state);
        } else {
            // Terminated while subscribing.
            drop(state);
            subscription.cancel();
        }

        Self { shared }
    }

    /// Receives the next value.
    ///
    /// Resolves to:
    /// - `Ok(Some(value))` for a buffered or newly delivered value,
    /// - `Ok(None)` once the source ended (after every buffered value) or
    ///   the channel was closed,
    /// - `Err(BridgeError::Operation(_))` once the source failed, after
    ///   every buffered value,
    /// - `Err(BridgeError::ConcurrentReceive)` if another task is already
    ///   waiting on this channel.
    ///
    /// A buffered value is returned without suspending.
    pub fn receive(&self) -> ReceiveFuture<'_, T> {
        ReceiveFuture {
            channel: self,
            id: self.shared.next_waiter.fetch_add(1, Ordering::Relaxed),
            done: false,
        }
    }

    /// Closes the channel.
    ///
    /// The source subscription is cancelled, buffered values are discarded
    /// and a waiting receiver resumes with `Ok(None)`. Closing again does
    /// nothing.
    pub fn close(&self) {
        let (subscription, waker) = {
            let mut state = self.shared.state.lock();

            if state.terminal.is_open() {
                debug!("receive channel closed");
                state.terminal = Terminal::Closed;
            }

            state.buffer.clear();
            (
                state.subscription.take(),
                state.waiter.as_mut().and_then(|w| w.waker.take()),
            )
        };

        if let Some(mut subscription) = subscription {
            subscription.cancel();
        }

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Number of values waiting to be received.
    pub fn buffered_len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// The channel bound.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Returns `true` once the source ended or failed, or the channel was
    /// closed.
    pub fn is_terminated(&self) -> bool {
        !self.shared.state.lock().terminal.is_open()
    }

    /// Returns `true` while the source is asked to hold deliveries back.
    pub fn is_source_paused(&self) -> bool {
        self.shared.state.lock().paused
    }
}

impl<T> fmt::Debug for ReceiveChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();

        f.debug_struct("ReceiveChannel")
            .field("buffered", &state.buffer.len())
            .field("capacity", &self.shared.capacity)
            .field("terminal", &state.terminal)
            .field("paused", &state.paused)
            .finish()
    }
}

/// Future returned by [`ReceiveChannel::receive`].
#[must_use = "futures do nothing unless awaited"]
pub struct ReceiveFuture<'a, T> {
    channel: &'a ReceiveChannel<T>,
    id: u64,
    done: bool,
}

impl<T: Send + 'static> Future for ReceiveFuture<'_, T> {
    type Output = Result<Option<T>, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let shared = &this.channel.shared;

        assert!(!this.done, "ReceiveFuture polled after completion");

        let (outcome, resume) = {
            let mut state = shared.state.lock();

            if state.waiter.as_ref().is_some_and(|w| w.id != this.id) {
                drop(state);
                error!("concurrent receive on the same channel");
                this.done = true;
                return Poll::Ready(Err(BridgeError::ConcurrentReceive));
            }

            if let Some(value) = state.buffer.pop_front() {
                let resume = state.paused && state.buffer.len() <= shared.low_water;
                if resume {
                    state.paused = false;
                }

                state.waiter = None;
                (Some(Ok(Some(value))), resume)
            } else {
                match &state.terminal {
                    Terminal::Open => {
                        state.waiter = Some(Waiter {
                            id: this.id,
                            waker: Some(cx.waker().clone()),
                        });
                        (None, false)
                    }
                    Terminal::Ended | Terminal::Closed => {
                        state.waiter = None;
                        (Some(Ok(None)), false)
                    }
                    Terminal::Failed(cause) => {
                        let err = BridgeError::Operation(cause.clone());
                        state.waiter = None;
                        (Some(Err(err)), false)
                    }
                }
            }
        };

        if resume {
            trace!(low_water = shared.low_water, "resuming source");
            shared.apply_flow(false);
        }

        match outcome {
            Some(outcome) => {
                this.done = true;
                Poll::Ready(outcome)
            }
            None => Poll::Pending,
        }
    }
}

impl<T> Drop for ReceiveFuture<'_, T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        let mut state = self.channel.shared.state.lock();
        if state.waiter.as_ref().is_some_and(|w| w.id == self.id) {
            state.waiter = None;
        }
    }
}
