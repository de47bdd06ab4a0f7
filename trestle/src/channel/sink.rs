/// Callback run once a saturated sink can accept writes again.
pub type DrainCallback = Box<dyn FnOnce() + Send + 'static>;

/// A push-based consumer of values with a bounded write queue.
pub trait PushSink<T>: Send + Sync {
    /// Offers `value` to the sink.
    ///
    /// Returns the value back as `Err` when the sink is saturated; the
    /// caller should wait for the drain notification and try again.
    fn write(&self, value: T) -> Result<(), T>;

    /// Installs the callback run once the sink drains.
    ///
    /// Replaces any previously installed callback. The callback runs at
    /// most once and may run on any thread.
    fn on_drain(&self, callback: DrainCallback);

    /// Closes the sink. Writes after close may be dropped.
    fn close(&self) {}
}
