use std::error::Error;
use std::sync::Arc;

/// The failure reported by an external callback, source or sink.
///
/// Causes are reference counted so that a sticky failure (for example a
/// channel whose source failed) can be reported to every later caller.
pub type Cause = Arc<dyn Error + Send + Sync>;

/// Errors surfaced by suspension points of the bridge.
///
/// Failures coming from the wrapped callback sources are delivered as
/// [`BridgeError::Operation`]. The remaining variants describe scheduling
/// and protocol outcomes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// The wrapped callback reported a failure.
    #[error("operation failed: {0}")]
    Operation(Cause),

    /// Work was scheduled on an execution context that has been torn down.
    #[error("execution context is closed")]
    ContextClosed,

    /// The task was cancelled while suspended.
    #[error("task was cancelled")]
    Cancelled,

    /// Two tasks raced to receive on the same channel.
    #[error("another task is already waiting to receive on this channel")]
    ConcurrentReceive,

    /// Two tasks raced to send on the same channel.
    #[error("another task is already waiting to send on this channel")]
    ConcurrentSend,

    /// The channel reached a terminal state before the operation.
    #[error("channel is closed")]
    ChannelClosed,

    /// A continuation was settled a second time.
    #[error("continuation was already resumed")]
    AlreadyResumed,

    /// The task body panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl BridgeError {
    /// Wraps any error-like value into [`BridgeError::Operation`].
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let err = BridgeError::operation("connection reset");
    /// ```
    pub fn operation<E>(error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        BridgeError::Operation(cause(error))
    }

    /// Returns the external cause when this is an operation failure.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            BridgeError::Operation(cause) => Some(cause),
            _ => None,
        }
    }

    /// Returns `true` for [`BridgeError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }
}

/// Converts an error-like value into a shareable [`Cause`].
pub fn cause<E>(error: E) -> Cause
where
    E: Into<Box<dyn Error + Send + Sync>>,
{
    Arc::from(error.into())
}
