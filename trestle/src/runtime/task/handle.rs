use super::core::{Runnable, Task};
use super::state::TaskState;
use crate::error::BridgeError;
use crate::runtime::context::ContextId;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A handle to a launched task.
///
/// A `JoinHandle` resolves with the task outcome:
/// - `Ok(value)` when the body returned,
/// - `Err(BridgeError::Cancelled)` when the task was cancelled,
/// - `Err(BridgeError::Panicked(_))` when the body panicked.
///
/// Dropping the `JoinHandle` does **not** cancel the task; it only
/// discards the ability to observe its result. Use [`JoinHandle::cancel`]
/// for that.
pub struct JoinHandle<T> {
    /// Shared reference to the underlying task.
    task: Arc<Task<T>>,

    /// Set once the outcome has been handed out.
    done: bool,
}

impl<T: Send + 'static> JoinHandle<T> {
    pub(crate) fn new(task: Arc<Task<T>>) -> Self {
        Self { task, done: false }
    }

    /// Requests cancellation of the task.
    ///
    /// The body is dropped on its own context at its next suspension point;
    /// an in-flight continuation is settled with [`BridgeError::Cancelled`]
    /// and its registration released. Returns `false` if the task already
    /// finished.
    pub fn cancel(&self) -> bool {
        self.task.request_cancel()
    }

    /// Returns `true` once the outcome is available.
    pub fn is_finished(&self) -> bool {
        self.task.is_settled()
    }

    /// Returns the current lifecycle state of the task.
    pub fn state(&self) -> TaskState {
        self.task.raw_state()
    }

    /// Returns the context the task is bound to.
    pub fn context(&self) -> ContextId {
        self.task.context_id()
    }

    /// Returns a type-erased handle that can observe and cancel the task.
    pub fn task_handle(&self) -> TaskHandle {
        TaskHandle {
            task: self.task.clone(),
        }
    }
}

impl<T: Send + 'static> Future for JoinHandle<T> {
    type Output = Result<T, BridgeError>;

    /// Polls the join handle.
    ///
    /// The waker is registered **before** re-checking the outcome to avoid
    /// missed wake-ups.
    ///
    /// # Panics
    ///
    /// Panics if polled again after returning `Poll::Ready`.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.done, "JoinHandle polled after completion");

        if let Some(outcome) = this.task.take_result() {
            this.done = true;
            return Poll::Ready(outcome);
        }

        this.task.add_waiter(cx.waker());

        if let Some(outcome) = this.task.take_result() {
            this.done = true;
            return Poll::Ready(outcome);
        }

        Poll::Pending
    }
}

impl<T> Unpin for JoinHandle<T> {}

impl<T: Send + 'static> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("context", &self.task.context_id())
            .field("state", &self.task.raw_state())
            .finish()
    }
}

/// A cloneable, type-erased handle to a task.
///
/// Unlike [`JoinHandle`], a `TaskHandle` cannot observe the value produced
/// by the task, only its state.
#[derive(Clone)]
pub struct TaskHandle {
    task: Arc<dyn Runnable>,
}

impl TaskHandle {
    /// Requests cancellation of the task. See [`JoinHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.task.clone().cancel()
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    pub fn context(&self) -> ContextId {
        self.task.context()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("context", &self.task.context())
            .field("state", &self.task.state())
            .finish()
    }
}
