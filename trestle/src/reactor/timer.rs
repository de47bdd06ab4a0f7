use crate::runtime::context::ExecutionContext;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifier of a timer armed through [`Timers`](crate::time::Timers).
///
/// The identifier is also the value passed to the timer handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) u64);

impl TimerId {
    /// Returns the raw identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Callback invoked when a timer fires.
pub(crate) type TimerHandler = Arc<dyn Fn(TimerId) + Send + Sync + 'static>;

/// What an armed timer runs, kept apart from its queue entry so that
/// cancelling releases it at once.
pub(crate) struct ArmedTimer {
    /// Handler run on `context` when the timer fires.
    pub(crate) handler: TimerHandler,

    /// Context the handler is scheduled on.
    pub(crate) context: Arc<ExecutionContext>,
}

/// An entry in the reactor timer queue.
///
/// Entries are stored in a `BinaryHeap` ordered by deadline. A periodic
/// entry is pushed back with its next deadline after firing.
pub(crate) struct TimerEntry {
    /// Identity of the timer.
    pub(crate) id: TimerId,

    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Re-arm interval for periodic timers.
    pub(crate) period: Option<Duration>,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by identifier.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap. Ties fall back to the identifier so timers
    /// armed for the same instant fire in the order they were set.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
