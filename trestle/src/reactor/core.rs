use super::command::Command;
use super::timer::{ArmedTimer, TimerEntry, TimerHandler, TimerId};
use crate::runtime::context::ExecutionContext;

use parking_lot::Mutex;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// The timer reactor.
///
/// The reactor runs on a dedicated thread and is responsible for:
/// - keeping armed timers ordered by deadline,
/// - sleeping until the next deadline or the next command,
/// - scheduling expired timer handlers on their execution context.
pub(crate) struct Reactor {
    /// Channel receiving commands from runtime handles.
    receiver: Receiver<Command>,

    /// Min-heap of pending timers ordered by deadline.
    timers: BinaryHeap<TimerEntry>,

    /// Handlers of the timers that are still armed.
    armed: Arc<Mutex<HashMap<TimerId, ArmedTimer>>>,
}

/// Cloneable handle used to talk to the reactor thread.
#[derive(Clone)]
pub(crate) struct ReactorHandle {
    sender: Sender<Command>,
    armed: Arc<Mutex<HashMap<TimerId, ArmedTimer>>>,
    next_id: Arc<AtomicU64>,
}

impl Reactor {
    /// Starts the reactor on its own thread.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn the thread.
    pub(crate) fn start() -> (ReactorHandle, thread::JoinHandle<()>) {
        let (sender, receiver) = channel();
        let armed = Arc::new(Mutex::new(HashMap::new()));

        let mut reactor = Reactor {
            receiver,
            timers: BinaryHeap::new(),
            armed: armed.clone(),
        };

        let handle = thread::Builder::new()
            .name("trestle-reactor".to_string())
            .spawn(move || reactor.run())
            .expect("failed to spawn reactor thread");

        let reactor_handle = ReactorHandle {
            sender,
            armed,
            next_id: Arc::new(AtomicU64::new(1)),
        };

        (reactor_handle, handle)
    }

    /// Runs the reactor loop until shutdown.
    fn run(&mut self) {
        debug!("timer reactor started");

        loop {
            let command = match self.timers.peek() {
                Some(next) => {
                    let wait = next.deadline.saturating_duration_since(Instant::now());
                    self.receiver.recv_timeout(wait)
                }
                None => self
                    .receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match command {
                Ok(Command::SetTimer(entry)) => self.timers.push(entry),
                Ok(Command::CancelTimer(id)) => self.timers.retain(|entry| entry.id != id),
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            self.fire_expired();
        }

        self.timers.clear();
        let armed = std::mem::take(&mut *self.armed.lock());
        drop(armed);

        debug!("timer reactor stopped");
    }

    /// Schedules every expired timer and re-arms periodic ones.
    fn fire_expired(&mut self) {
        let now = Instant::now();

        while let Some(timer) = self.timers.peek() {
            if timer.deadline > now {
                break;
            }

            let Some(mut timer) = self.timers.pop() else {
                break;
            };

            let context = self.armed.lock().get(&timer.id).map(|t| t.context.clone());
            let Some(context) = context else {
                trace!(timer = %timer.id, "skipping cancelled timer");
                continue;
            };

            if !self.fire(&timer, &context) {
                continue;
            }

            if let Some(period) = timer.period {
                timer.deadline = now + period;
                self.timers.push(timer);
            }
        }
    }

    /// Schedules the handler of `timer` on `context`.
    ///
    /// The handler is looked up when the work actually runs, so a timer
    /// cancelled after expiry but before execution stays silent.
    /// Returns `false` when the context is gone.
    fn fire(&self, timer: &TimerEntry, context: &ExecutionContext) -> bool {
        let id = timer.id;
        let periodic = timer.period.is_some();
        let armed = self.armed.clone();

        let work = Box::new(move || {
            let handler = if periodic {
                armed.lock().get(&id).map(|t| t.handler.clone())
            } else {
                let timer = armed.lock().remove(&id);
                timer.map(|t| t.handler)
            };

            if let Some(handler) = handler {
                handler(id);
            }
        });

        if context.schedule(work).is_err() {
            trace!(timer = %id, "dropping timer of closed context");
            let timer = self.armed.lock().remove(&id);
            drop(timer);
            return false;
        }

        true
    }
}

impl ReactorHandle {
    /// Arms a timer whose handler runs on `context`.
    pub(crate) fn set_timer(
        &self,
        context: Arc<ExecutionContext>,
        delay: Duration,
        period: Option<Duration>,
        handler: TimerHandler,
    ) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.armed.lock().insert(id, ArmedTimer { handler, context });

        let entry = TimerEntry {
            id,
            deadline: Instant::now() + delay,
            period,
        };

        if self.sender.send(Command::SetTimer(entry)).is_err() {
            trace!(timer = %id, "reactor is gone, timer will never fire");
            let timer = self.armed.lock().remove(&id);
            drop(timer);
        }

        id
    }

    /// Disarms a timer and releases its handler. Returns `true` if it was
    /// still armed.
    pub(crate) fn cancel_timer(&self, id: TimerId) -> bool {
        let Some(timer) = self.armed.lock().remove(&id) else {
            return false;
        };

        // Dropped outside the lock: the handler may own values whose drop
        // cancels other timers.
        drop(timer);
        let _ = self.sender.send(Command::CancelTimer(id));
        true
    }

    /// Returns `true` while the timer may still fire.
    pub(crate) fn is_armed(&self, id: TimerId) -> bool {
        self.armed.lock().contains_key(&id)
    }

    /// Returns `true` if both handles talk to the same reactor.
    pub(crate) fn same_reactor(&self, other: &ReactorHandle) -> bool {
        Arc::ptr_eq(&self.armed, &other.armed)
    }

    /// Asks the reactor thread to stop.
    pub(crate) fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}
