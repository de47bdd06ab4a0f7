use crate::bridge::Subscription;
use crate::error::Cause;

use std::fmt;
use std::sync::Arc;

/// A push-based producer of values.
///
/// The source calls the handlers it was subscribed with from any thread,
/// whenever it has something to deliver. It should honour [`pause`] and
/// [`resume`]; a source that ignores them still loses no data, the
/// consuming channel simply buffers past its bound.
///
/// [`pause`]: PushSource::pause
/// [`resume`]: PushSource::resume
pub trait PushSource<T>: Send + Sync {
    /// Installs `handlers` and returns the registration.
    ///
    /// The source may deliver values before returning.
    fn subscribe(&self, handlers: SourceHandlers<T>) -> Subscription;

    /// Asks the source to stop delivering until [`resume`](Self::resume).
    fn pause(&self) {}

    /// Lets a paused source deliver again.
    fn resume(&self) {}
}

/// The callbacks a [`PushSource`] delivers to.
///
/// After `end` or `fail` the source should not deliver anything else;
/// deliveries after termination are ignored by the channel.
pub struct SourceHandlers<T> {
    on_value: Arc<dyn Fn(T) + Send + Sync>,
    on_end: Arc<dyn Fn() + Send + Sync>,
    on_failure: Arc<dyn Fn(Cause) + Send + Sync>,
}

impl<T> Clone for SourceHandlers<T> {
    fn clone(&self) -> Self {
        Self {
            on_value: self.on_value.clone(),
            on_end: self.on_end.clone(),
            on_failure: self.on_failure.clone(),
        }
    }
}

impl<T> SourceHandlers<T> {
    pub fn new<V, E, F>(on_value: V, on_end: E, on_failure: F) -> Self
    where
        V: Fn(T) + Send + Sync + 'static,
        E: Fn() + Send + Sync + 'static,
        F: Fn(Cause) + Send + Sync + 'static,
    {
        Self {
            on_value: Arc::new(on_value),
            on_end: Arc::new(on_end),
            on_failure: Arc::new(on_failure),
        }
    }

    /// Delivers one value.
    pub fn value(&self, value: T) {
        (self.on_value)(value)
    }

    /// Signals the end of the stream.
    pub fn end(&self) {
        (self.on_end)()
    }

    /// Signals a failure of the stream.
    pub fn fail(&self, cause: Cause) {
        (self.on_failure)(cause)
    }
}

impl<T> fmt::Debug for SourceHandlers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandlers").finish_non_exhaustive()
    }
}
