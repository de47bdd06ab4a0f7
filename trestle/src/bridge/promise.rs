use super::continuation::Continuation;
use super::suspend::suspend;
use crate::error::BridgeError;

use parking_lot::Mutex;
use std::error::Error;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::mem;
use std::pin::Pin;
use std::sync::Arc;

type Callback<T> = Box<dyn FnOnce(Result<T, BridgeError>) + Send + 'static>;

/// Failure of an [`Eventual`] whose every [`Promise`] was dropped unsettled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("promise dropped without being completed")]
pub struct BrokenPromise;

enum State<T> {
    /// Not settled yet; holds the consumer callback once registered.
    Pending(Option<Callback<T>>),

    /// Settled; the outcome waits for the consumer.
    Settled(Result<T, BridgeError>),

    /// The outcome was handed to the consumer.
    Delivered,
}

struct Shared<T> {
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    /// Settles the value. Returns `false` if it was already settled.
    fn settle(&self, outcome: Result<T, BridgeError>) -> bool {
        let callback = {
            let mut state = self.state.lock();

            match &mut *state {
                State::Pending(callback) => match callback.take() {
                    Some(callback) => {
                        *state = State::Delivered;
                        callback
                    }
                    None => {
                        *state = State::Settled(outcome);
                        return true;
                    }
                },
                State::Settled(_) | State::Delivered => return false,
            }
        };

        callback(outcome);
        true
    }
}

/// Fails the eventual when the last promise goes away unsettled.
struct Owner<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Drop for Owner<T> {
    fn drop(&mut self) {
        self.shared
            .settle(Err(BridgeError::Operation(Arc::new(BrokenPromise))));
    }
}

/// Write side of a settable-once value.
///
/// Clones share the value: whichever clone settles first wins, later
/// attempts return `false`. If every clone is dropped before settling, the
/// [`Eventual`] fails with [`BrokenPromise`].
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
    _owner: Arc<Owner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            _owner: self._owner.clone(),
        }
    }
}

/// Read side of a settable-once value.
///
/// An `Eventual` has a single consumer: either a callback installed with
/// [`on_complete`](Eventual::on_complete), or a task awaiting it (directly
/// or through [`await_future`]).
pub struct Eventual<T> {
    shared: Arc<Shared<T>>,
}

/// Creates a connected [`Promise`] / [`Eventual`] pair.
///
/// # Examples
///
/// ```rust,ignore
/// let (promise, eventual) = promise::<u32>();
///
/// std::thread::spawn(move || {
///     promise.complete(7);
/// });
///
/// assert_eq!(eventual.await?, 7);
/// ```
pub fn promise<T>() -> (Promise<T>, Eventual<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Pending(None)),
    });

    let promise = Promise {
        shared: shared.clone(),
        _owner: Arc::new(Owner {
            shared: shared.clone(),
        }),
    };

    (promise, Eventual { shared })
}

impl<T> Promise<T> {
    /// Settles with `outcome`. Returns `false` if already settled.
    pub fn try_complete(&self, outcome: Result<T, BridgeError>) -> bool {
        self.shared.settle(outcome)
    }

    /// Settles with a value. Returns `false` if already settled.
    pub fn complete(&self, value: T) -> bool {
        self.try_complete(Ok(value))
    }

    /// Settles with a failure, delivered as [`BridgeError::Operation`].
    /// Returns `false` if already settled.
    pub fn fail<E>(&self, error: E) -> bool
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.try_complete(Err(BridgeError::operation(error)))
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.shared.state.lock(), State::Pending(_))
    }
}

impl<T> Eventual<T> {
    /// An eventual that is already settled with `value`.
    pub fn ready(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// An eventual that is already failed with `error`.
    pub fn failed(error: BridgeError) -> Self {
        Self::settled(Err(error))
    }

    fn settled(outcome: Result<T, BridgeError>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Settled(outcome)),
            }),
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.shared.state.lock(), State::Pending(_))
    }

    /// Installs the consumer callback.
    ///
    /// `callback` runs once with the outcome: right away, on the calling
    /// thread, if the value is already settled; otherwise on the thread
    /// that settles it.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(Result<T, BridgeError>) + Send + 'static,
    {
        let outcome = {
            let mut state = self.shared.state.lock();

            match mem::replace(&mut *state, State::Delivered) {
                State::Pending(_) => {
                    *state = State::Pending(Some(Box::new(callback)));
                    return;
                }
                State::Settled(outcome) => outcome,
                State::Delivered => return,
            }
        };

        callback(outcome);
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T> fmt::Debug for Eventual<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Eventual")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Suspends until `eventual` settles and returns its outcome.
///
/// An eventual that is already settled still resumes the task on its next
/// scheduler turn, never synchronously.
///
/// # Errors
///
/// - the failure the eventual settled with,
/// - [`BridgeError::Cancelled`] if the task is cancelled while waiting.
pub async fn await_future<T>(eventual: Eventual<T>) -> Result<T, BridgeError>
where
    T: Send + 'static,
{
    suspend(move |continuation: Continuation<T>| {
        eventual.on_complete(move |outcome| {
            continuation.settle(outcome);
        });
    })
    .await
}

impl<T: Send + 'static> IntoFuture for Eventual<T> {
    type Output = Result<T, BridgeError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(await_future(self))
    }
}
