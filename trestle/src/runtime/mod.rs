//! Core runtime components.
//!
//! This module contains the context affinity dispatcher: the execution
//! contexts (one event-loop thread each), the table that maps context
//! identities to their queues, and the tasks bound to them.
//!
//! It is responsible for:
//! - running every step of a task on the context it was launched on,
//! - re-entering that context whenever a suspended task is woken,
//! - tearing tasks down when their context closes.
//!
//! Most users will interact with [`Runtime`](crate::Runtime),
//! [`Dispatcher`](crate::Dispatcher) and the [`task`] functions rather
//! than with the internals.

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod core;
pub(crate) mod dispatcher;
pub(crate) mod yield_now;

pub mod task;

use context::ExecutionContext;

use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// The execution context whose event loop runs on this thread.
    ///
    /// Set for the lifetime of a context thread, so tasks, timers and
    /// awaiters can find their scheduling domain without explicit
    /// parameter passing.
    pub(crate) static CURRENT_CONTEXT: RefCell<Option<Arc<ExecutionContext>>> =
        const { RefCell::new(None) };
}

/// Installs `context` as the current context for the duration of `f`.
///
/// The previous value is restored afterwards, so nested entries behave.
pub(crate) fn enter_context<R>(context: Arc<ExecutionContext>, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_CONTEXT.with(|cell| cell.replace(Some(context)));

    let out = f();

    CURRENT_CONTEXT.with(|cell| cell.replace(previous));

    out
}

/// Returns the context running on this thread, if any.
pub(crate) fn current_context() -> Option<Arc<ExecutionContext>> {
    CURRENT_CONTEXT.with(|cell| cell.borrow().clone())
}
