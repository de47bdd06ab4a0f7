use super::timer::{TimerEntry, TimerId};

/// Messages understood by the reactor thread.
pub(crate) enum Command {
    /// Arm a new timer.
    SetTimer(TimerEntry),

    /// Drop the queue entry of a cancelled timer.
    CancelTimer(TimerId),

    /// Stop the reactor loop.
    Shutdown,
}
