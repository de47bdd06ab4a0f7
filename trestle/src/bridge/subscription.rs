use std::fmt;

type Cancel = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a callback registration with an external source.
///
/// Cancelling the subscription deregisters the callback. Cancellation is
/// idempotent: only the first call reaches the source.
///
/// Dropping a `Subscription` does **not** cancel it, so a registration can
/// outlive the value that created it. Bridge awaiters cancel their
/// subscriptions explicitly when they resume or are abandoned.
pub struct Subscription {
    cancel: Option<Cancel>,
}

impl Subscription {
    /// Creates a subscription that runs `cancel` when cancelled.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to deregister.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Deregisters the callback. Later calls do nothing.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Returns `true` until the subscription is cancelled.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
