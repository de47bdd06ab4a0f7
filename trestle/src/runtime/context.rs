use crate::error::BridgeError;
use crate::reactor::ReactorHandle;
use crate::runtime::enter_context;
use crate::runtime::task::Runnable;
use crate::utils::{Slab, panic_message};

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info_span, trace};

/// A unit of work queued on an execution context.
pub(crate) type Work = Box<dyn FnOnce() + Send + 'static>;

/// Opaque identity of an execution context.
///
/// Identifiers are handed out by the [`Runtime`](crate::Runtime) and are
/// never reused while it is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub(crate) usize);

impl ContextId {
    /// Returns the numeric index of the context.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

/// A single-threaded scheduling domain.
///
/// Every context owns a FIFO work queue drained by exactly one event-loop
/// thread. Work can be pushed from any thread; it always runs on the
/// context thread, in the order it was queued.
///
/// The context also keeps a registry of the tasks bound to it so that they
/// can be cancelled when the context is torn down.
pub(crate) struct ExecutionContext {
    /// Identity of this context.
    id: ContextId,

    /// Pending work, executed front to back.
    queue: Mutex<VecDeque<Work>>,

    /// Wakes the event loop when work arrives or the context closes.
    condvar: Condvar,

    /// Set once the context has been torn down.
    closed: AtomicBool,

    /// Tasks currently bound to this context.
    tasks: Mutex<Slab<Arc<dyn Runnable>>>,

    /// Handle to the timer reactor shared by the runtime.
    reactor: ReactorHandle,
}

impl ExecutionContext {
    /// Creates a new, open context.
    pub(crate) fn new(id: ContextId, reactor: ReactorHandle) -> Self {
        Self {
            id,
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Slab::new(16)),
            reactor,
        }
    }

    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn reactor(&self) -> &ReactorHandle {
        &self.reactor
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Enqueues `work` to run later on this context.
    ///
    /// Safe to call from any thread, including the context thread itself.
    /// Never runs `work` synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ContextClosed`] once the context is torn down.
    pub(crate) fn schedule(&self, work: Work) -> Result<(), BridgeError> {
        let mut queue = self.queue.lock();

        // Checked under the queue lock so that `close` cannot interleave.
        if self.is_closed() {
            return Err(BridgeError::ContextClosed);
        }

        queue.push_back(work);
        drop(queue);

        self.condvar.notify_one();
        Ok(())
    }

    /// Registers a task bound to this context and returns its slot.
    pub(crate) fn register(&self, task: Arc<dyn Runnable>) -> Result<usize, BridgeError> {
        let mut tasks = self.tasks.lock();

        if self.is_closed() {
            return Err(BridgeError::ContextClosed);
        }

        Ok(tasks.insert(task))
    }

    /// Removes a finished task from the registry.
    pub(crate) fn forget(&self, key: usize) {
        self.tasks.lock().remove(key);
    }

    /// Returns the number of live tasks bound to this context.
    pub(crate) fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Marks the context as closed and wakes its event loop.
    ///
    /// Work already queued is discarded; tasks still bound to the context
    /// are cancelled by the event loop on its way out.
    pub(crate) fn close(&self) {
        let queue = self.queue.lock();
        let was_closed = self.closed.swap(true, Ordering::AcqRel);
        drop(queue);

        if !was_closed {
            debug!(context = %self.id, "closing execution context");
        }

        self.condvar.notify_all();
    }

    /// Runs the event loop until the context is closed.
    ///
    /// Each work item runs with this context installed as the current one.
    /// A panicking work item is logged and does not stop the loop.
    pub(crate) fn run(self: &Arc<Self>) {
        let span = info_span!("context", id = self.id.0);
        let _entered = span.enter();

        debug!("execution context started");

        enter_context(self.clone(), || {
            while let Some(work) = self.next() {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
                    error!(
                        "work item panicked on {}: {}",
                        self.id,
                        panic_message(payload.as_ref())
                    );
                }
            }

            self.teardown();
        });

        debug!("execution context stopped");
    }

    /// Blocks the context thread until work is available.
    ///
    /// Returns `None` once the context has been closed.
    fn next(&self) -> Option<Work> {
        let mut queue = self.queue.lock();

        loop {
            if self.is_closed() {
                return None;
            }

            if let Some(work) = queue.pop_front() {
                return Some(work);
            }

            self.condvar.wait(&mut queue);
        }
    }

    /// Discards pending work and cancels every task still bound here.
    ///
    /// Dropping the futures settles their in-flight continuations with
    /// [`BridgeError::Cancelled`] and deregisters their callbacks.
    fn teardown(&self) {
        let discarded: Vec<Work> = self.queue.lock().drain(..).collect();
        trace!(count = discarded.len(), "discarding queued work");
        drop(discarded);

        let tasks = self.tasks.lock().drain();
        if !tasks.is_empty() {
            debug!(count = tasks.len(), "cancelling tasks of closed context");
        }

        for task in tasks {
            task.close();
        }
    }
}
