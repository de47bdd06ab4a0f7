use super::continuation::Continuation;
use super::subscription::Subscription;
use super::suspend::suspend;
use crate::error::BridgeError;

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Shared between every clone of an [`EventHandler`].
struct Occurrence {
    /// Set by the first firing.
    fired: AtomicBool,

    /// Registration to cancel once the event fired or the wait is abandoned.
    subscription: Mutex<Option<Subscription>>,
}

impl Occurrence {
    /// Cancels the stored subscription, outside of the lock.
    fn unsubscribe(&self) {
        let subscription = self.subscription.lock().take();

        if let Some(mut subscription) = subscription {
            subscription.cancel();
        }
    }
}

/// Handler for an event that may fire many times.
///
/// Only the first firing resumes the awaiting task; later ones are ignored
/// without error. Clones share that state, so the handler can be registered
/// with several callbacks at once.
pub struct EventHandler<T> {
    continuation: Continuation<T>,
    occurrence: Arc<Occurrence>,
}

impl<T> Clone for EventHandler<T> {
    fn clone(&self) -> Self {
        Self {
            continuation: self.continuation.clone(),
            occurrence: self.occurrence.clone(),
        }
    }
}

impl<T: Send + 'static> EventHandler<T> {
    /// Delivers an occurrence of the event.
    pub fn fire(&self, value: T) {
        self.deliver(Ok(value));
    }

    /// Delivers a failure instead of an occurrence.
    pub fn fail(&self, error: BridgeError) {
        self.deliver(Err(error));
    }

    /// Returns `true` once the event fired or the wait was abandoned.
    pub fn is_done(&self) -> bool {
        self.occurrence.fired.load(Ordering::Acquire) || self.continuation.is_settled()
    }

    /// Turns the handler into a plain callback.
    pub fn into_fn(self) -> impl Fn(T) + Send + Sync + Clone + 'static {
        move |value| self.fire(value)
    }

    fn deliver(&self, outcome: Result<T, BridgeError>) {
        if self.occurrence.fired.swap(true, Ordering::AcqRel) {
            trace!("ignoring repeated event");
            return;
        }

        self.continuation.settle(outcome);
        self.occurrence.unsubscribe();
    }
}

impl<T> fmt::Debug for EventHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("fired", &self.occurrence.fired.load(Ordering::Acquire))
            .finish()
    }
}

/// Suspends until the first occurrence of a repeatable event.
///
/// `registrar` receives an [`EventHandler`] to install with the event
/// source and returns the resulting [`Subscription`]. The task resumes on
/// its own context with the value of the first occurrence; the subscription
/// is cancelled right after it, including when the event fires while
/// `registrar` is still running.
///
/// # Errors
///
/// - the failure delivered through [`EventHandler::fail`],
/// - [`BridgeError::Cancelled`] if the task is cancelled while waiting.
///   The subscription is cancelled too.
///
/// # Examples
///
/// ```rust,ignore
/// let timers = Timers::current().unwrap();
///
/// let id = await_event(|handler| {
///     let handler = handler.into_fn();
///     let id = timers.set_periodic(Duration::from_millis(5), move |id| handler(id));
///     timers.subscription(id)
/// })
/// .await?;
/// ```
pub async fn await_event<T, R>(registrar: R) -> Result<T, BridgeError>
where
    T: Send + 'static,
    R: FnOnce(EventHandler<T>) -> Subscription,
{
    suspend(move |continuation: Continuation<T>| {
        let occurrence = Arc::new(Occurrence {
            fired: AtomicBool::new(false),
            subscription: Mutex::new(None),
        });

        let on_cancel = occurrence.clone();
        continuation.set_on_cancel(Box::new(move || on_cancel.unsubscribe()));

        let handler = EventHandler {
            continuation: continuation.clone(),
            occurrence: occurrence.clone(),
        };

        let subscription = registrar(handler);
        *occurrence.subscription.lock() = Some(subscription);

        // Fired or cancelled while registering.
        if occurrence.fired.load(Ordering::Acquire) || continuation.is_settled() {
            occurrence.unsubscribe();
        }
    })
    .await
}
