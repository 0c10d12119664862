//! Error types for chat operations

use huddle_store::StoreError;
use thiserror::Error;

/// Errors surfaced by membership and messaging operations.
///
/// Everything except [`ChatError::Transient`] and [`ChatError::Store`] is a
/// deterministic rejection and is never retried.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Permission denied: {0}")]
    Permission(String),
    #[error("Group is full (max {max} members)")]
    Capacity { max: usize },
    #[error("User is already a member: {0}")]
    DuplicateMember(String),
    #[error("Conversation not found: {0}")]
    NotFound(String),
    #[error("User is not a member: {0}")]
    NotMember(String),
    #[error("Conversation is not a group: {0}")]
    NotGroup(String),
    #[error("Temporary failure, try again: {0}")]
    Transient(String),
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl ChatError {
    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Transient(_))
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConversationNotFound(id) => ChatError::NotFound(id),
            err @ StoreError::TransactionExhausted { .. } => ChatError::Transient(err.to_string()),
            other => ChatError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
