//! In-memory transports.
//!
//! [`EventSource`] and [`WriteQueue`] implement [`PushSource`] and
//! [`PushSink`] without any I/O. They are handy for tests and for wiring
//! two parts of a program together through channels.

use super::sink::{DrainCallback, PushSink};
use super::source::{PushSource, SourceHandlers};
use crate::bridge::Subscription;
use crate::error::{Cause, cause};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

enum Event<T> {
    Value(T),
    End,
    Failure(Cause),
}

struct SourceState<T> {
    /// The current subscriber and the token of its subscription.
    subscriber: Option<(u64, SourceHandlers<T>)>,

    next_token: u64,

    /// Events not delivered yet.
    pending: VecDeque<Event<T>>,

    paused: bool,

    /// Set while a thread is delivering events.
    delivering: bool,

    /// Set once `end` or `fail` was called.
    finished: bool,
}

/// A push source fed by hand.
///
/// Events are queued at the source while it is paused, while nobody is
/// subscribed, or while another thread is delivering; they are delivered in
/// order, and never while the internal lock is held, so handlers may call
/// back into the source.
///
/// The source has a single subscriber: subscribing again replaces it.
///
/// # Examples
///
/// ```rust,ignore
/// let source = EventSource::new();
/// let channel = runtime.receive_channel(source.clone());
///
/// source.emit(1);
/// source.end();
/// ```
pub struct EventSource<T> {
    inner: Arc<Mutex<SourceState<T>>>,
}

impl<T> Clone for EventSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> EventSource<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SourceState {
                subscriber: None,
                next_token: 0,
                pending: VecDeque::new(),
                paused: false,
                delivering: false,
                finished: false,
            })),
        }
    }

    /// Emits a value. Ignored after `end` or `fail`.
    pub fn emit(&self, value: T) {
        self.enqueue(Event::Value(value));
    }

    /// Ends the stream. Later calls are ignored.
    pub fn end(&self) {
        self.enqueue(Event::End);
    }

    /// Fails the stream. Later calls are ignored.
    pub fn fail<E>(&self, error: E)
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.enqueue(Event::Failure(cause(error)));
    }

    /// Number of active subscriptions (0 or 1).
    pub fn subscriber_count(&self) -> usize {
        usize::from(self.inner.lock().subscriber.is_some())
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Number of events queued at the source.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    fn enqueue(&self, event: Event<T>) {
        {
            let mut state = self.inner.lock();

            if state.finished {
                trace!("ignoring event emitted after termination");
                return;
            }

            if matches!(event, Event::End | Event::Failure(_)) {
                state.finished = true;
            }

            state.pending.push_back(event);
        }

        flush(&self.inner);
    }
}

impl<T: Send + 'static> Default for EventSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivers queued events until the queue is empty or delivery must stop.
///
/// Only one thread delivers at a time; the others leave their events in the
/// queue for it.
fn flush<T>(inner: &Mutex<SourceState<T>>) {
    {
        let mut state = inner.lock();

        if state.delivering {
            return;
        }

        state.delivering = true;
    }

    loop {
        let (handlers, event) = {
            let mut state = inner.lock();

            let handlers = match &state.subscriber {
                Some((_, handlers)) if !state.paused => Some(handlers.clone()),
                _ => None,
            };

            let next = handlers.and_then(|handlers| {
                state.pending.pop_front().map(|event| (handlers, event))
            });

            match next {
                Some(next) => next,
                None => {
                    state.delivering = false;
                    return;
                }
            }
        };

        match event {
            Event::Value(value) => handlers.value(value),
            Event::End => handlers.end(),
            Event::Failure(cause) => handlers.fail(cause),
        }
    }
}

impl<T: Send + 'static> PushSource<T> for EventSource<T> {
    fn subscribe(&self, handlers: SourceHandlers<T>) -> Subscription {
        let token = {
            let mut state = self.inner.lock();

            if state.subscriber.is_some() {
                debug!("replacing the subscriber of an event source");
            }

            let token = state.next_token;
            state.next_token += 1;
            // Flow control belongs to the previous subscriber.
            state.subscriber = Some((token, handlers));
            state.paused = false;
            token
        };

        flush(&self.inner);

        let inner: Weak<Mutex<SourceState<T>>> = Arc::downgrade(&self.inner);

        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                let mut state = inner.lock();

                if state.subscriber.as_ref().is_some_and(|(t, _)| *t == token) {
                    state.subscriber = None;
                    state.paused = false;
                }
            }
        })
    }

    fn pause(&self) {
        self.inner.lock().paused = true;
    }

    fn resume(&self) {
        self.inner.lock().paused = false;
        flush(&self.inner);
    }
}

impl<T> fmt::Debug for EventSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();

        f.debug_struct("EventSource")
            .field("subscribed", &state.subscriber.is_some())
            .field("pending", &state.pending.len())
            .field("paused", &state.paused)
            .field("finished", &state.finished)
            .finish()
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    drain: Option<DrainCallback>,
    closed: bool,
}

/// A push sink backed by a bounded in-memory queue.
///
/// Writes are refused once `max` items are queued. Taking items out fires
/// the drain callback as soon as the queue is down to half of `max`.
pub struct WriteQueue<T> {
    inner: Arc<Mutex<QueueState<T>>>,
    max: usize,
}

impl<T> Clone for WriteQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            max: self.max,
        }
    }
}

impl<T: Send + 'static> WriteQueue<T> {
    /// Creates a queue accepting up to `max` items.
    ///
    /// # Panics
    ///
    /// Panics if `max == 0`.
    pub fn new(max: usize) -> Self {
        assert!(max > 0, "write queue size must be > 0");

        Self {
            inner: Arc::new(Mutex::new(QueueState {
                items: VecDeque::new(),
                drain: None,
                closed: false,
            })),
            max,
        }
    }

    /// Takes up to `n` items from the front of the queue.
    pub fn take(&self, n: usize) -> Vec<T> {
        let (items, drain) = {
            let mut state = self.inner.lock();

            let n = n.min(state.items.len());
            let items: Vec<T> = state.items.drain(..n).collect();

            let drain = if state.items.len() <= self.max / 2 {
                state.drain.take()
            } else {
                None
            };

            (items, drain)
        };

        if let Some(drain) = drain {
            trace!("write queue drained");
            drain();
        }

        items
    }

    /// Takes every queued item.
    pub fn take_all(&self) -> Vec<T> {
        self.take(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().items.len() >= self.max
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl<T: Send + 'static> PushSink<T> for WriteQueue<T> {
    fn write(&self, value: T) -> Result<(), T> {
        let mut state = self.inner.lock();

        if state.closed {
            trace!("dropping write to a closed queue");
            return Ok(());
        }

        if state.items.len() >= self.max {
            return Err(value);
        }

        state.items.push_back(value);
        Ok(())
    }

    fn on_drain(&self, callback: DrainCallback) {
        self.inner.lock().drain = Some(callback);
    }

    fn close(&self) {
        let drain = {
            let mut state = self.inner.lock();
            state.closed = true;
            state.drain.take()
        };

        drop(drain);
    }
}

impl<T> fmt::Debug for WriteQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();

        f.debug_struct("WriteQueue")
            .field("len", &state.items.len())
            .field("max", &self.max)
            .field("closed", &state.closed)
            .finish()
    }
}
