//! Error types for store operations

use sea_orm::DbErr;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Transaction on conversation {id} gave up after {attempts} conflicting attempts")]
    TransactionExhausted { id: String, attempts: u32 },
    #[error("Invalid database path: {0}")]
    InvalidPath(PathBuf),
}

impl StoreError {
    /// Whether retrying the whole operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::TransactionExhausted { .. })
    }
}
