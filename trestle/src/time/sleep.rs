use super::Timers;
use crate::bridge::{EventHandler, await_event};
use crate::reactor::TimerId;

use std::time::Duration;

/// Completes after `duration` has elapsed.
///
/// The wait is a one-shot timer awaited with
/// [`await_event`](crate::bridge::await_event): the task is suspended, the
/// context keeps running other work, and the task resumes on its context
/// once the timer fires. Dropping the future disarms the timer.
///
/// # Panics
///
/// Panics if polled outside of an execution context.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// sleep(Duration::from_millis(10)).await;
/// ```
pub async fn sleep(duration: Duration) {
    let timers = Timers::current().expect("sleep must be awaited within an execution context");

    // Only fails when cancelled, in which case this future is being dropped.
    let _ = await_event(|handler: EventHandler<TimerId>| {
        let id = timers.set_timer(duration, move |id| handler.fire(id));
        timers.subscription(id)
    })
    .await;
}
