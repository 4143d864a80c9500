//! Command Error Types

use thiserror::Error;

use super::CommandType;
use crate::process::ProcessError;
use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    // === Construction Errors ===
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // === Routing Errors ===
    #[error("Handler for {expected} received a {actual} command")]
    UnexpectedCommand {
        expected: CommandType,
        actual: CommandType,
    },

    #[error("No handler registered for {0}")]
    NoHandler(CommandType),

    #[error("Handler for {0} already registered")]
    DuplicateHandler(CommandType),

    #[error("Command queue closed")]
    QueueClosed,

    // === Domain Errors ===
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::InvalidCommand(_) => "INVALID_COMMAND",
            CommandError::UnexpectedCommand { .. } => "UNEXPECTED_COMMAND",
            CommandError::NoHandler(_) => "NO_HANDLER",
            CommandError::DuplicateHandler(_) => "DUPLICATE_HANDLER",
            CommandError::QueueClosed => "QUEUE_CLOSED",
            CommandError::Process(e) => e.code(),
            CommandError::Store(e) => e.code(),
        }
    }

    /// Whether running the same command again later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommandError::Store(StoreError::Unavailable(_))
                | CommandError::Store(StoreError::Conflict { .. })
        )
    }
}
