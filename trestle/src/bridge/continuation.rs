use crate::error::BridgeError;

use parking_lot::Mutex;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tracing::{error, trace};

type CancelHook = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of a continuation slot.
enum Slot<T> {
    /// The task is suspended; the waker resumes it on its context.
    Waiting(Option<Waker>),

    /// An outcome arrived and waits to be picked up by the task.
    Settled(Result<T, BridgeError>),

    /// The task picked up the outcome.
    Consumed,

    /// The suspension was abandoned before any outcome arrived.
    Cancelled,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,

    /// Runs once when the suspension is cancelled, to deregister callbacks.
    on_cancel: Mutex<Option<CancelHook>>,
}

/// Single-use resumption token of a suspended task.
///
/// A continuation is settled **at most once**. The first settle stores the
/// outcome and wakes the task; the wake re-enqueues it on its own context,
/// so the code after the suspension point runs there. Every later attempt
/// is rejected with [`BridgeError::AlreadyResumed`] and never resumes the
/// task a second time.
///
/// Clones refer to the same slot, so a continuation can be handed to
/// several callbacks racing to deliver the outcome.
pub struct Continuation<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Continuation<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> Continuation<T> {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::Waiting(None)),
                on_cancel: Mutex::new(None),
            }),
        }
    }

    /// Settles the continuation with `outcome` and resumes the task.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::AlreadyResumed`] if an outcome was already
    ///   delivered. This is a protocol violation and is logged.
    /// - [`BridgeError::Cancelled`] if the suspended task was cancelled in
    ///   the meantime. Late callbacks are expected, so nothing is logged.
    pub fn resume(&self, outcome: Result<T, BridgeError>) -> Result<(), BridgeError> {
        match self.try_settle(outcome) {
            Ok(()) => Ok(()),
            Err(BridgeError::AlreadyResumed) => {
                error!("continuation resumed more than once");
                Err(BridgeError::AlreadyResumed)
            }
            Err(err) => Err(err),
        }
    }

    /// Shorthand for `resume(Ok(value))`.
    pub fn succeed(&self, value: T) -> Result<(), BridgeError> {
        self.resume(Ok(value))
    }

    /// Shorthand for `resume(Err(error))`.
    pub fn fail(&self, error: BridgeError) -> Result<(), BridgeError> {
        self.resume(Err(error))
    }

    /// Returns `true` once the continuation can no longer be settled.
    pub fn is_settled(&self) -> bool {
        !matches!(*self.shared.slot.lock(), Slot::Waiting(_))
    }

    /// Settles without logging. Returns `false` if the slot was taken.
    pub(crate) fn settle(&self, outcome: Result<T, BridgeError>) -> bool {
        self.try_settle(outcome).is_ok()
    }

    fn try_settle(&self, outcome: Result<T, BridgeError>) -> Result<(), BridgeError> {
        let waker = {
            let mut slot = self.shared.slot.lock();

            match &mut *slot {
                Slot::Waiting(waker) => {
                    let waker = waker.take();
                    *slot = Slot::Settled(outcome);
                    waker
                }
                Slot::Cancelled => return Err(BridgeError::Cancelled),
                Slot::Settled(_) | Slot::Consumed => return Err(BridgeError::AlreadyResumed),
            }
        };

        // The cancel hook is only for abandoned suspensions.
        drop(self.shared.on_cancel.lock().take());

        trace!("continuation settled");

        if let Some(waker) = waker {
            waker.wake();
        }

        Ok(())
    }

    /// Installs the hook run when the suspension is abandoned.
    ///
    /// If the continuation is already cancelled the hook runs immediately.
    pub(crate) fn set_on_cancel(&self, hook: CancelHook) {
        if matches!(*self.shared.slot.lock(), Slot::Cancelled) {
            hook();
            return;
        }

        *self.shared.on_cancel.lock() = Some(hook);

        // Cancelled while installing: make sure the hook still runs.
        if matches!(*self.shared.slot.lock(), Slot::Cancelled) {
            if let Some(hook) = self.shared.on_cancel.lock().take() {
                hook();
            }
        }
    }

    /// Polls for the outcome, registering `cx`'s waker while waiting.
    ///
    /// # Panics
    ///
    /// Panics if the outcome was already consumed.
    pub(crate) fn poll_outcome(&self, cx: &mut Context<'_>) -> Poll<Result<T, BridgeError>> {
        let mut slot = self.shared.slot.lock();

        match mem::replace(&mut *slot, Slot::Consumed) {
            Slot::Waiting(_) => {
                *slot = Slot::Waiting(Some(cx.waker().clone()));
                Poll::Pending
            }
            Slot::Settled(outcome) => Poll::Ready(outcome),
            Slot::Cancelled => {
                *slot = Slot::Cancelled;
                Poll::Ready(Err(BridgeError::Cancelled))
            }
            Slot::Consumed => panic!("continuation outcome already consumed"),
        }
    }
}

impl<T> Continuation<T> {
    /// Abandons the suspension.
    ///
    /// A waiting slot becomes `Cancelled` so that late callbacks turn into
    /// no-ops, and the cancel hook runs. An outcome that arrived but was
    /// never consumed is dropped. The task is not woken.
    pub(crate) fn cancel(&self) {
        let previous = mem::replace(&mut *self.shared.slot.lock(), Slot::Cancelled);

        if let Slot::Waiting(_) = previous {
            trace!("continuation cancelled");

            if let Some(hook) = self.shared.on_cancel.lock().take() {
                hook();
            }
        }

        drop(previous);
    }

    /// Cancels the suspension unless its outcome was already picked up.
    pub(crate) fn abandon(&self) {
        if !matches!(*self.shared.slot.lock(), Slot::Consumed) {
            self.cancel();
        }
    }
}

impl<T> fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.shared.slot.lock() {
            Slot::Waiting(_) => "waiting",
            Slot::Settled(_) => "settled",
            Slot::Consumed => "consumed",
            Slot::Cancelled => "cancelled",
        };

        f.debug_struct("Continuation").field("state", &state).finish()
    }
}
