//! Timer utilities.
//!
//! This module provides the callback-based timer service of the runtime
//! and the suspension built on top of it.
//!
//! It includes:
//! - [`Timers`] for one-shot and periodic callbacks,
//! - [`sleep`] for suspending a task for some time.
//!
//! There is no built-in timeout; race an operation against [`sleep`] with
//! `select!` instead.

mod sleep;
mod timers;

pub use crate::reactor::TimerId;

#[doc(inline)]
pub use sleep::sleep;

#[doc(inline)]
pub use timers::Timers;
