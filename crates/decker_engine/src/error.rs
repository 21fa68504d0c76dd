//! Error types for decker_engine

use thiserror::Error;

/// Errors from the runtime and its command boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Structural scene mutation failed
    #[error(transparent)]
    Scene(#[from] decker_model::SceneError),

    /// The runtime has shut down and the command channel is closed
    #[error("runtime command channel is closed")]
    ChannelClosed,

    /// A blocking request was issued from the scheduler context itself,
    /// which would wait on its own tick
    #[error("blocking request from the scheduler context would deadlock")]
    WouldDeadlock,

    /// The command completed but produced no result where one was expected
    #[error("command produced no result")]
    NoResult,

    /// Operation not valid for this model kind
    #[error("operation not supported for this model kind")]
    UnsupportedKind,
}

/// Result type for decker_engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
