//! Commands and Command Handlers
//!
//! Commands are plain data. Each handler accepts exactly one command type and
//! is resolved through the [`CommandHandlerRegistry`] by the command's tag.

pub mod cancel;
pub mod check_timeout;
pub mod error;
pub mod registry;

pub use cancel::{CancelTransferProcessCommand, CancelTransferProcessCommandHandler};
pub use check_timeout::{
    CheckTimeoutCommandHandler, CheckTransferProcessTimeoutCommand, TIMEOUT_ERROR_DETAIL,
};
pub use error::CommandError;
pub use registry::CommandHandlerRegistry;

use std::fmt;

use async_trait::async_trait;

/// Routing tag of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    CheckTimeout,
    Cancel,
}

impl CommandType {
    pub const ALL: [CommandType; 2] = [CommandType::CheckTimeout, CommandType::Cancel];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::CheckTimeout => "CHECK_TIMEOUT",
            CommandType::Cancel => "CANCEL",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CheckTimeout(CheckTransferProcessTimeoutCommand),
    Cancel(CancelTransferProcessCommand),
}

impl Command {
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::CheckTimeout(_) => CommandType::CheckTimeout,
            Command::Cancel(_) => CommandType::Cancel,
        }
    }
}

impl From<CheckTransferProcessTimeoutCommand> for Command {
    fn from(cmd: CheckTransferProcessTimeoutCommand) -> Self {
        Command::CheckTimeout(cmd)
    }
}

impl From<CancelTransferProcessCommand> for Command {
    fn from(cmd: CancelTransferProcessCommand) -> Self {
        Command::Cancel(cmd)
    }
}

/// Outcome of one handler invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleReport {
    /// Processes loaded from the store
    pub scanned: usize,
    /// Processes transitioned and saved
    pub transitioned: usize,
    /// Processes dropped because of a recoverable per-process error
    pub skipped: usize,
}

/// Executor bound to one command type
///
/// `handle` must be safe to repeat: running it again after a crash re-applies
/// the same transitions to processes that still qualify and leaves the rest
/// alone.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Routing key for the registry
    fn accepted_type(&self) -> CommandType;

    async fn handle(&self, command: &Command) -> Result<HandleReport, CommandError>;
}
