use super::continuation::Continuation;
use super::suspend::suspend;
use crate::error::BridgeError;
use crate::utils::panic_message;

use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

/// One-shot completion handed to a single-callback operation.
///
/// Completing consumes the handle, so an operation can report at most one
/// outcome. A `Completion` dropped without completing leaves the awaiting
/// task suspended until it is cancelled.
pub struct Completion<T> {
    continuation: Continuation<T>,
}

impl<T: Send + 'static> Completion<T> {
    /// Reports the outcome of the operation and resumes the awaiting task.
    ///
    /// A failure is delivered to the task as [`BridgeError::Operation`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Cancelled`] if the awaiting task was cancelled
    /// before the operation completed; the outcome is dropped.
    pub fn complete<E>(self, outcome: Result<T, E>) -> Result<(), BridgeError>
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.continuation
            .resume(outcome.map_err(BridgeError::operation))
    }

    /// Shorthand for `complete(Ok(value))`.
    pub fn succeed(self, value: T) -> Result<(), BridgeError> {
        self.continuation.resume(Ok(value))
    }

    /// Shorthand for `complete(Err(error))`.
    pub fn fail<E>(self, error: E) -> Result<(), BridgeError>
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.continuation.resume(Err(BridgeError::operation(error)))
    }

    /// Returns `true` if the awaiting task gave up on the result.
    ///
    /// Long-running operations can poll this to stop early.
    pub fn is_cancelled(&self) -> bool {
        self.continuation.is_settled()
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("continuation", &self.continuation)
            .finish()
    }
}

/// Suspends until a single-callback operation reports its outcome.
///
/// `operation` is called once, on the awaiting task's context, with a
/// [`Completion`]. It may complete synchronously or hand the completion to
/// any thread; either way the task resumes on its own context.
///
/// # Errors
///
/// - [`BridgeError::Operation`] carrying the failure reported by the
///   operation,
/// - [`BridgeError::Cancelled`] if the task is cancelled while waiting.
///
/// # Examples
///
/// ```rust,ignore
/// let length = await_result(|completion| {
///     legacy_api.read_len(move |result| {
///         let _ = completion.complete(result);
///     });
/// })
/// .await?;
/// ```
pub async fn await_result<T, F>(operation: F) -> Result<T, BridgeError>
where
    T: Send + 'static,
    F: FnOnce(Completion<T>),
{
    suspend(move |continuation| operation(Completion { continuation })).await
}

/// Runs a blocking closure on a helper thread and awaits its result.
///
/// The event loop of the calling context keeps running while `f` blocks.
///
/// # Errors
///
/// - [`BridgeError::Panicked`] if `f` panics,
/// - [`BridgeError::Operation`] if the helper thread cannot be spawned,
/// - [`BridgeError::Cancelled`] if the task is cancelled while waiting.
///   The helper thread still runs `f` to completion.
pub async fn await_blocking<T, F>(f: F) -> Result<T, BridgeError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    suspend(move |continuation: Continuation<T>| {
        let worker = continuation.clone();

        let spawned = thread::Builder::new()
            .name("trestle-blocking".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(f))
                    .map_err(|payload| BridgeError::Panicked(panic_message(payload.as_ref())));

                worker.settle(outcome);
            });

        if let Err(err) = spawned {
            continuation.settle(Err(BridgeError::operation(err)));
        }
    })
    .await
}
