use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Completes on its second poll.
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    /// The first poll wakes the task right away, which puts it at the back
    /// of its context queue, and returns `Poll::Pending`.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Yields back to the execution context.
///
/// The task is re-queued behind the work already pending on its context,
/// so callbacks and other tasks queued before it run first.
///
/// # Examples
///
/// ```rust,ignore
/// async fn step() {
///     // Let queued resumptions run
///     yield_now().await;
/// }
/// ```
pub async fn yield_now() {
    YieldNow { yielded: false }.await
}
