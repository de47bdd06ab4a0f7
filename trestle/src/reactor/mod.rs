//! Timer reactor.
//!
//! The reactor runs on a dedicated thread and owns a deadline-ordered heap
//! of timers. When a timer expires it does not run the handler itself:
//! the handler is scheduled on the execution context the timer belongs to,
//! so timer callbacks obey the same context affinity as every other
//! resumption.
//!
//! It communicates with the rest of the runtime through [`Command`]
//! messages sent over a channel.

mod core;
mod timer;

pub(crate) mod command;

pub(crate) use self::core::{Reactor, ReactorHandle};
pub use timer::TimerId;
