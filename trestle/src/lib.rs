//! # Trestle
//!
//! **Trestle** bridges callback-driven event loops and sequential async code.
//!
//! Code running on a single-threaded event loop usually reports results
//! through callbacks. Trestle lets a task written as a plain `async` body
//! wait for those callbacks without ever blocking the loop thread, and
//! guarantees that the task always continues on the context it started on.
//!
//! It provides:
//!
//! - **Execution contexts**: single-threaded event loops with FIFO queues,
//!   and a [`Dispatcher`] to schedule work or tasks on any of them
//! - **One-shot awaiters**: [`await_result`], [`await_event`] and
//!   [`await_future`], each resuming its task exactly once
//! - **Backpressured channels** over push-based sources and sinks
//! - **Timers** with callbacks that run on an execution context
//! - **Macros** like `#[trestle::main]`, `#[trestle::test]` and `select!`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trestle::bridge::await_result;
//! use trestle::task;
//!
//! #[trestle::main]
//! async fn main() {
//!     let origin = task::current_context();
//!
//!     let value = await_result(|completion| {
//!         std::thread::spawn(move || {
//!             let _ = completion.succeed(42);
//!         });
//!     })
//!     .await
//!     .unwrap();
//!
//!     // Resumed on the context the task started on.
//!     assert_eq!(task::current_context(), origin);
//!     assert_eq!(value, 42);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`bridge`]: suspension points over callbacks
//! - [`channel`]: bounded channels over push sources and sinks
//! - [`task`]: launching and observing tasks
//! - [`time`]: timers and sleep

mod error;
mod reactor;
mod runtime;
mod utils;

pub mod bridge;
pub mod channel;
pub mod time;

pub use bridge::{await_blocking, await_event, await_future, await_result, suspend};
pub use channel::{Channel, ChannelBuilder, ReceiveChannel, SendChannel};
pub use error::{BridgeError, Cause, cause};
pub use runtime::builder::RuntimeBuilder;
pub use runtime::context::ContextId;
pub use runtime::core::Runtime;
pub use runtime::dispatcher::Dispatcher;
pub use runtime::task;
pub use runtime::task::current_dispatcher;
pub use runtime::yield_now::yield_now;

pub use trestle_macros::*;
