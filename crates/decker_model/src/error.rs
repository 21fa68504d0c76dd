//! Error types for decker_model

use thiserror::Error;

/// Errors from structural scene mutations
///
/// Property-level rejection is not an error (see
/// [`crate::model::SetOutcome`]); these cover tree operations that must
/// either fully apply or leave the scene untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Id does not refer to a model in the arena
    #[error("unknown model id")]
    UnknownModel,

    /// Operation targeted a torn-down model
    #[error("model has been torn down")]
    TornDown,

    /// Attach would create a second parent link
    #[error("model is already attached to a parent")]
    AlreadyAttached,

    /// Detach/reorder on a model with no parent
    #[error("model is not attached to a parent")]
    NotAttached,

    /// Attach would make the tree cyclic
    #[error("attach would create a cycle")]
    WouldCycle,

    /// Parent/child kinds cannot nest (cards live under the stack only)
    #[error("model kinds cannot nest this way")]
    KindMismatch,

    /// Saved data referenced an unknown model type
    #[error("unknown model type: {0}")]
    UnknownType(String),
}

/// Result type for scene operations
pub type Result<T> = std::result::Result<T, SceneError>;
