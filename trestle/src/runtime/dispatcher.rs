use crate::bridge::Continuation;
use crate::error::BridgeError;
use crate::reactor::ReactorHandle;
use crate::runtime::context::{ContextId, ExecutionContext};
use crate::runtime::task::{JoinHandle, launch_on};

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};

/// Table of the execution contexts owned by a runtime.
///
/// The table maps context identities to their queues and keeps the
/// event-loop thread of every context so they can be joined on shutdown.
pub(crate) struct ContextTable {
    /// Contexts indexed by their identifier. Closed contexts stay listed.
    contexts: Mutex<Vec<Arc<ExecutionContext>>>,

    /// Event-loop threads still to be joined.
    threads: Mutex<Vec<thread::JoinHandle<()>>>,

    /// Prefix of the event-loop thread names.
    thread_name: String,

    /// Timer reactor shared by every context.
    reactor: ReactorHandle,
}

impl ContextTable {
    pub(crate) fn new(thread_name: String, reactor: ReactorHandle) -> Self {
        Self {
            contexts: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            thread_name,
            reactor,
        }
    }

    /// Creates a context and starts its event-loop thread.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn the thread.
    pub(crate) fn spawn_context(&self) -> ContextId {
        let mut contexts = self.contexts.lock();

        let id = ContextId(contexts.len());
        let context = Arc::new(ExecutionContext::new(id, self.reactor.clone()));
        contexts.push(context.clone());
        drop(contexts);

        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.thread_name, id.0))
            .spawn(move || context.run())
            .expect("failed to spawn context thread");

        self.threads.lock().push(handle);

        debug!(context = %id, "execution context created");
        id
    }

    pub(crate) fn get(&self, id: ContextId) -> Option<Arc<ExecutionContext>> {
        self.contexts.lock().get(id.0).cloned()
    }

    /// Returns the identifiers of every context that is still open.
    pub(crate) fn open(&self) -> Vec<ContextId> {
        self.contexts
            .lock()
            .iter()
            .filter(|context| !context.is_closed())
            .map(|context| context.id())
            .collect()
    }

    /// Closes one context. Returns `false` if it was unknown.
    pub(crate) fn close(&self, id: ContextId) -> bool {
        match self.get(id) {
            Some(context) => {
                context.close();
                true
            }
            None => false,
        }
    }

    pub(crate) fn close_all(&self) {
        let contexts = self.contexts.lock().clone();

        for context in contexts {
            context.close();
        }
    }

    /// Joins every event-loop thread, except the calling one.
    pub(crate) fn join(&self) {
        let threads = std::mem::take(&mut *self.threads.lock());
        let current = thread::current().id();

        for handle in threads {
            if handle.thread().id() == current {
                continue;
            }

            if handle.join().is_err() {
                error!("execution context thread panicked");
            }
        }
    }
}

/// A cloneable handle that schedules work onto one execution context.
///
/// The dispatcher is `Send`: it can be captured by a callback running on any
/// thread and used to get back onto the context it targets.
///
/// # Examples
///
/// ```rust,ignore
/// let dispatcher = trestle::task::current_dispatcher().unwrap();
///
/// std::thread::spawn(move || {
///     dispatcher.dispatch(|| println!("back on the context")).ok();
/// });
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    context: Arc<ExecutionContext>,
}

impl Dispatcher {
    pub(crate) fn new(context: Arc<ExecutionContext>) -> Self {
        Self { context }
    }

    /// Returns the context this dispatcher targets.
    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    /// Enqueues `work` on the target context.
    ///
    /// Never runs `work` synchronously, even when called from the target
    /// context itself.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ContextClosed`] once the context is torn down.
    pub fn dispatch<F>(&self, work: F) -> Result<(), BridgeError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.context.schedule(Box::new(work))
    }

    /// Launches `future` as a new task on the target context.
    ///
    /// See [`task::launch`](crate::task::launch).
    pub fn launch<F, T>(&self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        launch_on(&self.context, future)
    }

    /// Settles `continuation` from the target context.
    ///
    /// The settle itself is queued; a settle that loses the race against
    /// another one is logged and dropped there.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ContextClosed`] once the context is torn down.
    pub fn resume<T: Send + 'static>(
        &self,
        continuation: &Continuation<T>,
        outcome: Result<T, BridgeError>,
    ) -> Result<(), BridgeError> {
        let continuation = continuation.clone();

        self.dispatch(move || {
            let _ = continuation.resume(outcome);
        })
    }

    /// Returns `true` once the target context is torn down.
    pub fn is_closed(&self) -> bool {
        self.context.is_closed()
    }

    /// Returns the number of live tasks bound to the target context.
    pub fn task_count(&self) -> usize {
        self.context.task_count()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("context", &self.context.id())
            .field("closed", &self.context.is_closed())
            .finish()
    }
}
