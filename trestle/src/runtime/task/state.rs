/// Task is suspended and not scheduled.
///
/// The task waits for a continuation to wake it.
pub(crate) const IDLE: usize = 0;

/// Task is queued on its context.
pub(crate) const QUEUED: usize = 1;

/// Task is currently being polled on its context thread.
pub(crate) const RUNNING: usize = 2;

/// Task has completed execution.
///
/// The future has returned `Poll::Ready` and will not be polled again.
pub(crate) const COMPLETED: usize = 3;

/// Task has been notified while running.
///
/// It is re-queued once the current poll returns.
pub(crate) const NOTIFIED: usize = 4;

/// Task has been cancelled, either explicitly or because its context closed.
pub(crate) const CANCELLED: usize = 5;

/// The task body panicked.
pub(crate) const FAILED: usize = 6;

/// Observable lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Queued or currently running on its context.
    Runnable,
    /// Waiting for a continuation to resume it.
    Suspended,
    /// Finished with a value.
    Completed,
    /// The body panicked.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl TaskState {
    pub(crate) fn from_raw(raw: usize) -> Self {
        match raw {
            IDLE => TaskState::Suspended,
            COMPLETED => TaskState::Completed,
            FAILED => TaskState::Failed,
            CANCELLED => TaskState::Cancelled,
            _ => TaskState::Runnable,
        }
    }

    /// Returns `true` once the task can no longer run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}
