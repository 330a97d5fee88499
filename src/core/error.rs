//! Error types for controller operations.

use thiserror::Error;

/// Errors produced by controller components.
///
/// The `Display` text is what a client sees in an `erro` reply, so it is kept
/// short and free of system detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Login name (or sender pid) already belongs to an active session.
    #[error("user '{0}' already exists")]
    DuplicateIdentity(String),
    /// A bounded table has no free slot left.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    /// Command or payload could not be parsed.
    #[error("syntax error: {0}")]
    SyntaxError(String),
    /// Unknown service id for the caller.
    #[error("not found: {0}")]
    NotFound(String),
    /// The command is valid but not allowed in the caller's current state.
    #[error("{0}")]
    PreconditionFailed(String),
    /// Reply channel could not be reached.
    #[error("channel unavailable: {0}")]
    ResourceUnavailable(String),
    /// Vehicle worker could not be started.
    #[error("vehicle could not be started: {0}")]
    SpawnFailure(String),
}

impl DispatchError {
    /// Whether a dispatch attempt failing with this error may be retried later
    /// through renegotiation.
    #[must_use]
    pub const fn is_transient_capacity(&self) -> bool {
        matches!(self, Self::CapacityExceeded(_) | Self::SpawnFailure(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
