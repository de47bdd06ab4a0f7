use super::continuation::Continuation;
use crate::error::BridgeError;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Suspends the calling task until a [`Continuation`] is settled.
///
/// On the first poll the task is armed for resumption and `register`
/// receives the continuation, typically to hand it to a callback-based
/// API. The task then resumes exactly once, on its own context, with the
/// outcome of the first settle.
///
/// Even when `register` settles the continuation synchronously, the task
/// only resumes on its next scheduler turn, behind work already queued on
/// its context.
///
/// Dropping the future before it resolves (for example because the task was
/// cancelled) settles the continuation as cancelled, so late callbacks are
/// ignored.
///
/// # Examples
///
/// ```rust,ignore
/// let value = suspend(|continuation| {
///     std::thread::spawn(move || {
///         let _ = continuation.succeed(7);
///     });
/// })
/// .await?;
/// ```
pub fn suspend<T, R>(register: R) -> Suspend<T, R>
where
    T: Send + 'static,
    R: FnOnce(Continuation<T>),
{
    Suspend {
        register: Some(register),
        continuation: Continuation::new(),
    }
}

/// Future returned by [`suspend`].
#[must_use = "futures do nothing unless awaited"]
pub struct Suspend<T, R> {
    /// Registration callback, taken on the first poll.
    register: Option<R>,

    continuation: Continuation<T>,
}

impl<T, R> Future for Suspend<T, R>
where
    T: Send + 'static,
    R: FnOnce(Continuation<T>),
{
    type Output = Result<T, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(register) = this.register.take() {
            // Arm the waker before anyone can settle.
            if let Poll::Ready(outcome) = this.continuation.poll_outcome(cx) {
                return Poll::Ready(outcome);
            }

            register(this.continuation.clone());
            return Poll::Pending;
        }

        this.continuation.poll_outcome(cx)
    }
}

// `register` is never pinned.
impl<T, R> Unpin for Suspend<T, R> {}

impl<T, R> Drop for Suspend<T, R> {
    fn drop(&mut self) {
        self.continuation.abandon();
    }
}
