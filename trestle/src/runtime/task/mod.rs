//! Task primitives.
//!
//! A task is a launched asynchronous body bound to one execution context.
//! It is polled only on that context's thread and resumed there after every
//! suspension, whichever thread delivered the result.
//!
//! Most users interact with this module through [`launch`] and the
//! [`JoinHandle`] it returns.

mod core;
mod handle;
mod state;
mod waker;

pub(crate) use self::core::{Runnable, launch_on};

pub use self::core::launch;
pub use handle::{JoinHandle, TaskHandle};
pub use state::TaskState;

use crate::runtime::context::ContextId;
use crate::runtime::dispatcher::Dispatcher;

/// Returns the identity of the execution context running the caller.
///
/// Returns `None` on threads that are not execution contexts.
pub fn current_context() -> Option<ContextId> {
    crate::runtime::current_context().map(|context| context.id())
}

/// Returns a dispatcher targeting the execution context running the caller.
///
/// This is the usual way to capture "where to resume" before handing a
/// callback to foreign code.
pub fn current_dispatcher() -> Option<Dispatcher> {
    crate::runtime::current_context().map(Dispatcher::new)
}
