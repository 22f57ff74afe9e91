//! Error types for the conversation workflow.

use storesql_core::error::StoreSqlError;

/// Errors from the conversation workflow.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("generation error: {0}")]
    Generation(String),
    #[error("tool call limit of {0} rounds reached")]
    ToolRoundLimit(usize),
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreSqlError> for ChatError {
    fn from(err: StoreSqlError) -> Self {
        match err {
            StoreSqlError::Llm { .. }
            | StoreSqlError::InvalidApiKey { .. }
            | StoreSqlError::RateLimited => ChatError::Generation(err.to_string()),
            other => ChatError::Storage(other.to_string()),
        }
    }
}
