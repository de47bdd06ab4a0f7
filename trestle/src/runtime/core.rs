use super::context::{ContextId, ExecutionContext};
use super::dispatcher::{ContextTable, Dispatcher};
use super::task::{JoinHandle, launch_on};
use crate::channel::{Channel, ChannelBuilder, PushSink, PushSource, ReceiveChannel, SendChannel};
use crate::error::BridgeError;
use crate::reactor::{Reactor, ReactorHandle};
use crate::time::Timers;

use parking_lot::Mutex;
use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};
use tracing::debug;

/// The main runtime handle.
///
/// `Runtime` is responsible for:
/// - creating and closing execution contexts,
/// - launching tasks onto a chosen context,
/// - running the timer reactor shared by every context,
/// - providing a synchronous entry point via [`block_on`](Self::block_on).
///
/// Dropping the runtime shuts down all internal components in an orderly
/// fashion.
pub struct Runtime {
    /// Every context created by this runtime.
    table: Arc<ContextTable>,

    /// Handle to the reactor thread.
    reactor: ReactorHandle,

    /// Reactor thread, joined on shutdown.
    reactor_thread: Mutex<Option<thread::JoinHandle<()>>>,

    /// Default channel bound.
    channel_capacity: usize,

    /// Set once [`shutdown`](Self::shutdown) ran.
    shut_down: AtomicBool,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    ///
    /// See [`RuntimeBuilder`](crate::RuntimeBuilder) for the options.
    pub fn new() -> Self {
        super::builder::RuntimeBuilder::new().build()
    }

    /// Starts the reactor and `contexts` execution contexts.
    pub(crate) fn with_config(contexts: usize, channel_capacity: usize, thread_name: String) -> Self {
        let (reactor, reactor_thread) = Reactor::start();
        let table = Arc::new(ContextTable::new(thread_name, reactor.clone()));

        for _ in 0..contexts {
            table.spawn_context();
        }

        debug!(contexts, channel_capacity, "runtime started");

        Self {
            table,
            reactor,
            reactor_thread: Mutex::new(Some(reactor_thread)),
            channel_capacity,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Returns the identifier of the `index`-th context, if it exists.
    pub fn context(&self, index: usize) -> Option<ContextId> {
        self.table.get(ContextId(index)).map(|context| context.id())
    }

    /// Returns the identifiers of every open context.
    pub fn contexts(&self) -> Vec<ContextId> {
        self.table.open()
    }

    /// Creates a new execution context with its own event-loop thread.
    pub fn create_context(&self) -> ContextId {
        self.table.spawn_context()
    }

    /// Closes a context.
    ///
    /// Pending work is discarded and every task still bound to the context
    /// is cancelled. Returns `false` if the context is unknown.
    pub fn close_context(&self, id: ContextId) -> bool {
        self.table.close(id)
    }

    /// Returns a dispatcher targeting `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ContextClosed`] if the context is unknown or
    /// already closed.
    pub fn dispatcher(&self, id: ContextId) -> Result<Dispatcher, BridgeError> {
        self.open_context(id).map(Dispatcher::new)
    }

    /// Launches `future` as a new task on context `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ContextClosed`] if the context is unknown.
    /// A context that closes after this call makes the handle resolve to
    /// [`BridgeError::Cancelled`].
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let id = runtime.context(0).unwrap();
    /// let handle = runtime.launch(id, async { 42 })?;
    /// ```
    pub fn launch<F, T>(&self, id: ContextId, future: F) -> Result<JoinHandle<T>, BridgeError>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let context = self.table.get(id).ok_or(BridgeError::ContextClosed)?;
        Ok(launch_on(&context, future))
    }

    /// Returns the number of live tasks bound to context `id`.
    pub fn task_count(&self, id: ContextId) -> usize {
        self.table.get(id).map_or(0, |context| context.task_count())
    }

    /// Runs a future to completion on the first open context, blocking the
    /// calling thread.
    ///
    /// This is the synchronous entry point of the runtime (e.g. in `main`
    /// or tests). The calling thread only parks; the future itself runs on
    /// the context thread.
    ///
    /// # Panics
    ///
    /// - if called from an execution context thread,
    /// - if no context is open,
    /// - if the future panics (the panic is re-raised here),
    /// - if the context closes before the future completes.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let result = runtime.block_on(async {
    ///     42
    /// });
    /// assert_eq!(result, 42);
    /// ```
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = *self
            .contexts()
            .first()
            .expect("block_on requires an open execution context");

        self.block_on_context(id, future)
    }

    /// Runs a future to completion on context `id`, blocking the calling
    /// thread.
    ///
    /// # Panics
    ///
    /// Same as [`block_on`](Self::block_on), and if `id` is unknown or
    /// closed.
    pub fn block_on_context<F>(&self, id: ContextId, future: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        assert!(
            super::current_context().is_none(),
            "block_on cannot be called from an execution context"
        );

        let context = self
            .open_context(id)
            .expect("block_on requires an open execution context");

        match park_on(launch_on(&context, future)) {
            Ok(output) => output,
            Err(BridgeError::Panicked(message)) => panic::resume_unwind(Box::new(message)),
            Err(err) => panic!("block_on future did not complete: {err}"),
        }
    }

    /// Returns the timer service of this runtime.
    ///
    /// Handlers of timers set from outside any context run on the first
    /// open context.
    ///
    /// # Panics
    ///
    /// Panics if the runtime has no context at all, which the builder
    /// rules out.
    pub fn timers(&self) -> Timers {
        let fallback = self
            .contexts()
            .first()
            .and_then(|id| self.table.get(*id))
            .or_else(|| self.table.get(ContextId(0)))
            .expect("runtime has at least one execution context");

        Timers::new(self.reactor.clone(), fallback)
    }

    /// Returns the default channel bound.
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Wraps `source` into a receive channel with the default bound.
    pub fn receive_channel<T, S>(&self, source: S) -> ReceiveChannel<T>
    where
        T: Send + 'static,
        S: PushSource<T> + 'static,
    {
        self.channel_builder().receive(source)
    }

    /// Wraps `sink` into a send channel.
    pub fn send_channel<T, K>(&self, sink: K) -> SendChannel<T>
    where
        T: Send + 'static,
        K: PushSink<T> + 'static,
    {
        self.channel_builder().send(sink)
    }

    /// Wraps a source and a sink of the same transport into a duplex channel.
    pub fn channel<T, S, K>(&self, source: S, sink: K) -> Channel<T>
    where
        T: Send + 'static,
        S: PushSource<T> + 'static,
        K: PushSink<T> + 'static,
    {
        self.channel_builder().duplex(source, sink)
    }

    /// Closes every context, then stops the reactor.
    ///
    /// Tasks still alive are cancelled. Calling it again is a no-op; it also
    /// runs when the runtime is dropped.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.table.close_all();
        self.table.join();

        self.reactor.shutdown();

        if let Some(handle) = self.reactor_thread.lock().take() {
            let _ = handle.join();
        }

        debug!("runtime stopped");
    }

    fn channel_builder(&self) -> ChannelBuilder {
        ChannelBuilder::new().capacity(self.channel_capacity)
    }

    fn open_context(&self, id: ContextId) -> Result<Arc<ExecutionContext>, BridgeError> {
        self.table
            .get(id)
            .filter(|context| !context.is_closed())
            .ok_or(BridgeError::ContextClosed)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wakes a thread parked in [`park_on`].
struct ThreadNotify {
    thread: Thread,
    notified: AtomicBool,
}

impl Wake for ThreadNotify {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notified.store(true, Ordering::Release);
        self.thread.unpark();
    }
}

/// Parks the calling thread until `handle` resolves.
fn park_on<T: Send + 'static>(mut handle: JoinHandle<T>) -> Result<T, BridgeError> {
    let notify = Arc::new(ThreadNotify {
        thread: thread::current(),
        notified: AtomicBool::new(false),
    });

    let waker = Waker::from(notify.clone());
    let mut cx = Context::from_waker(&waker);

    loop {
        if let Poll::Ready(outcome) = Pin::new(&mut handle).poll(&mut cx) {
            return outcome;
        }

        while !notify.notified.swap(false, Ordering::Acquire) {
            thread::park();
        }
    }
}
