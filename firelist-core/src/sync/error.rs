//! Errors surfaced by the sync mediator.

use thiserror::Error;

/// What the user sees when an operation fails. Nothing here is retried
/// automatically and nothing here is fatal; the caller shows it and the user
/// may try again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TodoError {
    /// Bad local input: empty text, empty id, or no signed-in user.
    #[error("{0}")]
    Validation(String),

    /// The subscription could not start, or stopped delivering.
    #[error("Real-time data connection failed: {0}")]
    SyncFailure(String),

    /// The store rejected a create, update or delete.
    #[error("Failed to {op} task: {message}")]
    RemoteWrite { op: &'static str, message: String },
}

impl TodoError {
    pub fn validation(message: impl Into<String>) -> Self {
        TodoError::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, TodoError::Validation(_))
    }
}
