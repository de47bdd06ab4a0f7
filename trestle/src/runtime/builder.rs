use super::core::Runtime;

use std::thread;

/// Builder for configuring and creating a runtime.
///
/// `RuntimeBuilder` allows customizing runtime parameters before
/// constructing the runtime:
/// - the number of execution contexts started up front,
/// - the default bound of channels created through the runtime,
/// - the name prefix of the context threads.
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .contexts(2)
///     .channel_capacity(32)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    /// Number of execution contexts started with the runtime.
    contexts: usize,

    /// Default channel bound `N`.
    channel_capacity: usize,

    /// Prefix of context thread names.
    thread_name: String,
}

impl RuntimeBuilder {
    /// Creates a new `RuntimeBuilder` with default configuration.
    ///
    /// By default, one context is started per available logical CPU
    /// (falling back to `1`), channels hold 16 values and context threads
    /// are named `trestle-context-<index>`.
    pub fn new() -> Self {
        let contexts = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            contexts,
            channel_capacity: 16,
            thread_name: "trestle-context".to_string(),
        }
    }

    /// Sets the number of execution contexts started with the runtime.
    ///
    /// More contexts can be added later with
    /// [`Runtime::create_context`](crate::Runtime::create_context).
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn contexts(mut self, n: usize) -> Self {
        assert!(n > 0, "contexts must be > 0");

        self.contexts = n;
        self
    }

    /// Sets the default bound of channels created through the runtime.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn channel_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "channel_capacity must be > 0");

        self.channel_capacity = n;
        self
    }

    /// Sets the name prefix of context threads.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Builds the runtime with the configured options.
    ///
    /// This starts the timer reactor and every execution context.
    pub fn build(self) -> Runtime {
        Runtime::with_config(self.contexts, self.channel_capacity, self.thread_name)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
