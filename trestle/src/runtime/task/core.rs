use super::JoinHandle;
use super::state::{CANCELLED, COMPLETED, FAILED, IDLE, NOTIFIED, QUEUED, RUNNING, TaskState};
use crate::error::BridgeError;
use crate::runtime::context::{ContextId, ExecutionContext};
use crate::runtime::current_context;
use crate::runtime::task::waker::make_waker;
use crate::utils::panic_message;

use parking_lot::Mutex;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};
use tracing::{debug, error, trace};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Slot value used before a task is registered with its context.
const UNREGISTERED: usize = usize::MAX;

/// Type-erased view of a task, as seen by its execution context.
pub(crate) trait Runnable: Send + Sync {
    /// Polls the task once. Called on the context thread.
    fn run(self: Arc<Self>);

    /// Requests cancellation. Returns `false` if the task already finished.
    fn cancel(self: Arc<Self>) -> bool;

    /// Cancels the task in place because its context is being torn down.
    fn close(self: Arc<Self>);

    /// Returns the observable state of the task.
    fn state(&self) -> TaskState;

    /// Returns the context the task is bound to.
    fn context(&self) -> ContextId;
}

/// A task bound to one execution context.
///
/// A `Task` owns the future of a launched body. Every poll happens on the
/// owning context's thread: waking the task re-enqueues it on that context,
/// which is what gives resumptions their context affinity.
pub(crate) struct Task<T> {
    /// The body. `None` once the task finished or was cancelled.
    future: Mutex<Option<BoxFuture<T>>>,

    /// Outcome waiting to be picked up by the `JoinHandle`.
    result: Mutex<Option<Result<T, BridgeError>>>,

    /// Set once the outcome has been published.
    settled: AtomicBool,

    /// Lifecycle state (IDLE, QUEUED, RUNNING, ...).
    state: AtomicUsize,

    /// Owning execution context.
    context: Arc<ExecutionContext>,

    /// Registry slot inside the owning context.
    key: AtomicUsize,

    /// Wakers of `JoinHandle`s awaiting this task.
    waiters: Mutex<Vec<Waker>>,
}

impl<T: Send + 'static> Task<T> {
    /// Creates a new task in the `QUEUED` state.
    pub(crate) fn new<F>(future: F, context: Arc<ExecutionContext>) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            future: Mutex::new(Some(Box::pin(future))),
            result: Mutex::new(None),
            settled: AtomicBool::new(false),
            state: AtomicUsize::new(QUEUED),
            context,
            key: AtomicUsize::new(UNREGISTERED),
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Polls the task on its context thread.
    ///
    /// - `Poll::Pending`: back to `IDLE`, or re-queued if woken meanwhile.
    /// - `Poll::Ready`: the outcome is published to the `JoinHandle`.
    /// - panic: the task fails with [`BridgeError::Panicked`].
    ///
    /// A cancellation requested during the poll is honoured right after it.
    pub(crate) fn run(self: Arc<Self>) {
        let current = self.state.load(Ordering::Acquire);

        if current != QUEUED && current != NOTIFIED {
            return;
        }

        // Transition to RUNNING. This guarantees a single poller.
        if self
            .state
            .compare_exchange(current, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let waker = make_waker(self.clone());
        let mut cx = Context::from_waker(&waker);

        let poll = {
            let mut slot = self.future.lock();
            let Some(future) = slot.as_mut() else {
                return;
            };

            panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))
        };

        match poll {
            Ok(Poll::Pending) => {
                match self.state.compare_exchange(
                    RUNNING,
                    IDLE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {}
                    Err(NOTIFIED) => {
                        // Woken while running; go back to the queue.
                        self.state.store(QUEUED, Ordering::Release);
                        self.schedule();
                    }
                    Err(CANCELLED) => {
                        self.release();
                        self.settle(Err(BridgeError::Cancelled));
                    }
                    Err(_) => {}
                }
            }
            Ok(Poll::Ready(value)) => self.finish(COMPLETED, Ok(value)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(context = %self.context.id(), "task panicked: {message}");
                self.finish(FAILED, Err(BridgeError::Panicked(message)));
            }
        }
    }

    /// Publishes the final outcome of a poll, unless cancelled meanwhile.
    fn finish(&self, terminal: usize, outcome: Result<T, BridgeError>) {
        let transitioned = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (state == RUNNING || state == NOTIFIED).then_some(terminal)
            })
            .is_ok();

        self.release();

        if transitioned {
            self.settle(outcome);
        } else {
            self.settle(Err(BridgeError::Cancelled));
        }
    }

    /// Signals the task to be rescheduled.
    ///
    /// If the task is `IDLE`, it moves to `QUEUED` and is pushed onto its
    /// own context. If the task is `RUNNING`, it moves to `NOTIFIED` so it
    /// is re-polled right after the current poll.
    pub(crate) fn wake(self: Arc<Self>) {
        loop {
            let state = self.state.load(Ordering::Acquire);

            match state {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.schedule();
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                // Already queued, notified or finished: nothing to do.
                _ => return,
            }
        }
    }

    /// Pushes a poll of this task onto its context.
    ///
    /// If the context is gone the task is cancelled on the spot.
    pub(crate) fn schedule(self: Arc<Self>) {
        let task = self.clone();

        if self.context.schedule(Box::new(move || task.run())).is_err() {
            trace!(context = %self.context.id(), "context closed, cancelling task");
            self.close_now();
        }
    }

    /// Records the registry slot assigned by the context.
    pub(crate) fn set_key(&self, key: usize) {
        self.key.store(key, Ordering::Release);
    }

    /// Requests cancellation of the task.
    ///
    /// The future is dropped on the owning context, which settles any
    /// pending continuation with [`BridgeError::Cancelled`]. Waiters on the
    /// `JoinHandle` are released only after that drop, so a cancelled
    /// channel receiver has vacated its slot by the time they run.
    pub(crate) fn request_cancel(self: &Arc<Self>) -> bool {
        loop {
            let state = self.state.load(Ordering::Acquire);

            if matches!(state, COMPLETED | FAILED | CANCELLED) {
                return false;
            }

            if self
                .state
                .compare_exchange(state, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            debug!(context = %self.context.id(), "task cancelled");

            // A poll in progress finishes the cancellation itself.
            if state != RUNNING && state != NOTIFIED {
                let task = self.clone();
                let scheduled = self.context.schedule(Box::new(move || {
                    task.release();
                    task.settle(Err(BridgeError::Cancelled));
                }));

                if scheduled.is_err() {
                    self.release();
                    self.settle(Err(BridgeError::Cancelled));
                }
            }

            return true;
        }
    }

    /// Cancels the task immediately, on the calling thread.
    pub(crate) fn close_now(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (!matches!(state, COMPLETED | FAILED)).then_some(CANCELLED)
            });

        self.release();
        self.settle(Err(BridgeError::Cancelled));
    }

    /// Drops the body and leaves the context registry.
    fn release(&self) {
        let future = self.future.lock().take();
        drop(future);

        let key = self.key.swap(UNREGISTERED, Ordering::AcqRel);
        if key != UNREGISTERED {
            self.context.forget(key);
        }
    }

    /// Publishes the outcome and wakes every `JoinHandle` waiter.
    fn settle(&self, outcome: Result<T, BridgeError>) {
        if self.settled.swap(true, Ordering::AcqRel) {
            return;
        }

        *self.result.lock() = Some(outcome);

        let waiters = std::mem::take(&mut *self.waiters.lock());
        for waiter in waiters {
            waiter.wake();
        }
    }

    /// Takes the published outcome, if any.
    pub(crate) fn take_result(&self) -> Option<Result<T, BridgeError>> {
        self.result.lock().take()
    }

    /// Registers a `JoinHandle` waker.
    pub(crate) fn add_waiter(&self, waker: &Waker) {
        let mut waiters = self.waiters.lock();

        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    pub(crate) fn raw_state(&self) -> TaskState {
        TaskState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn context_id(&self) -> ContextId {
        self.context.id()
    }
}

impl<T: Send + 'static> Runnable for Task<T> {
    fn run(self: Arc<Self>) {
        Task::run(self)
    }

    fn cancel(self: Arc<Self>) -> bool {
        self.request_cancel()
    }

    fn close(self: Arc<Self>) {
        self.close_now()
    }

    fn state(&self) -> TaskState {
        self.raw_state()
    }

    fn context(&self) -> ContextId {
        self.context_id()
    }
}

/// Launches `future` as a new task on `context`.
///
/// Returns immediately; the first poll happens later on the context thread.
/// On a closed context the returned handle resolves to
/// [`BridgeError::Cancelled`].
pub(crate) fn launch_on<F, T>(context: &Arc<ExecutionContext>, future: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let task = Arc::new(Task::new(future, context.clone()));

    match context.register(task.clone()) {
        Ok(key) => {
            task.set_key(key);
            task.clone().schedule();
        }
        Err(_) => task.close_now(),
    }

    JoinHandle::new(task)
}

/// Launches a future on the current execution context.
///
/// The body does not start synchronously: its first step is queued behind
/// the work already pending on the context.
///
/// # Panics
///
/// Panics if called outside of an execution context. Use
/// [`Runtime::launch`](crate::Runtime::launch) or
/// [`Dispatcher::launch`](crate::Dispatcher::launch) from other threads.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = trestle::task::launch(async { 21 * 2 });
/// assert_eq!(handle.await?, 42);
/// ```
pub fn launch<F, T>(future: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let context =
        current_context().expect("launch must be called within an execution context");

    launch_on(&context, future)
}
