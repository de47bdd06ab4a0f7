use crate::bridge::Subscription;
use crate::reactor::{ReactorHandle, TimerId};
use crate::runtime::context::ExecutionContext;
use crate::runtime::current_context;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback-based timer service of a runtime.
///
/// Handlers receive the [`TimerId`] of the timer that fired and run on an
/// execution context, never on the reactor thread: the context current
/// when the timer was set, or the runtime's first context when set from
/// another thread.
///
/// # Examples
///
/// ```rust,ignore
/// let timers = runtime.timers();
/// let id = timers.set_periodic(Duration::from_millis(10), |id| {
///     tracing::info!(%id, "tick");
/// });
///
/// timers.cancel_timer(id);
/// ```
#[derive(Clone)]
pub struct Timers {
    reactor: ReactorHandle,

    /// Context used for handlers set from outside this runtime's contexts.
    fallback: Arc<ExecutionContext>,
}

impl Timers {
    pub(crate) fn new(reactor: ReactorHandle, fallback: Arc<ExecutionContext>) -> Self {
        Self { reactor, fallback }
    }

    /// Returns the timer service of the runtime running the caller.
    ///
    /// Returns `None` outside of an execution context.
    pub fn current() -> Option<Self> {
        current_context().map(|context| Self {
            reactor: context.reactor().clone(),
            fallback: context,
        })
    }

    /// Arms a one-shot timer firing after `delay`.
    pub fn set_timer<F>(&self, delay: Duration, handler: F) -> TimerId
    where
        F: Fn(TimerId) + Send + Sync + 'static,
    {
        self.reactor
            .set_timer(self.target(), delay, None, Arc::new(handler))
    }

    /// Arms a timer firing every `interval` until cancelled.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn set_periodic<F>(&self, interval: Duration, handler: F) -> TimerId
    where
        F: Fn(TimerId) + Send + Sync + 'static,
    {
        assert!(!interval.is_zero(), "periodic interval must be > 0");

        self.reactor
            .set_timer(self.target(), interval, Some(interval), Arc::new(handler))
    }

    /// Disarms a timer. Returns `false` if it already fired (one-shot) or
    /// was already cancelled.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        self.reactor.cancel_timer(id)
    }

    /// Returns `true` while the timer may still fire.
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.reactor.is_armed(id)
    }

    /// Returns a [`Subscription`] whose cancellation disarms `id`.
    pub fn subscription(&self, id: TimerId) -> Subscription {
        let reactor = self.reactor.clone();

        Subscription::new(move || {
            reactor.cancel_timer(id);
        })
    }

    /// Context on which new handlers run.
    fn target(&self) -> Arc<ExecutionContext> {
        match current_context() {
            Some(context) if context.reactor().same_reactor(&self.reactor) => context,
            _ => self.fallback.clone(),
        }
    }
}

impl fmt::Debug for Timers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("fallback", &self.fallback.id())
            .finish()
    }
}
