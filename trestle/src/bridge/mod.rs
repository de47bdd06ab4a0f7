//! Callback-to-suspension bridge.
//!
//! This module turns callback-based completions into suspension points of
//! a task. Everything is built on [`suspend`]: the task hands a single-use
//! [`Continuation`] to some registration code, suspends, and resumes on its
//! own execution context once the continuation is settled.
//!
//! It includes:
//! - [`await_result`] for operations reporting one outcome through a
//!   [`Completion`],
//! - [`await_event`] for repeatable events where only the first occurrence
//!   counts,
//! - [`await_future`] for [`Eventual`] values produced elsewhere,
//! - [`await_blocking`] for blocking closures run on a helper thread.
//!
//! Registrations with external sources are represented by
//! [`Subscription`]s, which the awaiters cancel once they are done with
//! them.

mod continuation;
mod event;
mod promise;
mod result;
mod subscription;
mod suspend;

pub use continuation::Continuation;
pub use event::{EventHandler, await_event};
pub use promise::{BrokenPromise, Eventual, Promise, await_future, promise};
pub use result::{Completion, await_blocking, await_result};
pub use subscription::Subscription;
pub use suspend::{Suspend, suspend};
