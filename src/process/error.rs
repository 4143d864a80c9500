use thiserror::Error;

use super::state::TransferProcessState;
use super::types::TransferProcessId;

/// Errors raised by the transfer process entity itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Invalid state transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: TransferProcessId,
        from: TransferProcessState,
        to: TransferProcessState,
    },
}

impl ProcessError {
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::InvalidTransition { .. } => "INVALID_STATE_TRANSITION",
        }
    }
}
