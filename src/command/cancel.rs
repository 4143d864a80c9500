//! Cancel a single transfer process

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Command, CommandError, CommandHandler, CommandType, HandleReport};
use crate::clock::Clock;
use crate::process::TransferProcessId;
use crate::store::{StoreError, TransferProcessStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelTransferProcessCommand {
    process_id: TransferProcessId,
    reason: String,
}

impl CancelTransferProcessCommand {
    pub fn new(process_id: TransferProcessId, reason: impl Into<String>) -> Self {
        Self {
            process_id,
            reason: reason.into(),
        }
    }

    pub fn process_id(&self) -> TransferProcessId {
        self.process_id
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

pub struct CancelTransferProcessCommandHandler {
    store: Arc<dyn TransferProcessStore>,
    clock: Arc<dyn Clock>,
}

impl CancelTransferProcessCommandHandler {
    pub fn new(store: Arc<dyn TransferProcessStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Cancel the process unless it already reached a terminal state.
    ///
    /// A missing process is an error; conflicts are returned so a queued
    /// command can be retried against a fresh read.
    pub async fn cancel(
        &self,
        command: &CancelTransferProcessCommand,
    ) -> Result<HandleReport, CommandError> {
        let id = command.process_id();
        let mut tp = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        let mut report = HandleReport {
            scanned: 1,
            ..HandleReport::default()
        };

        if tp.state().is_terminal() {
            debug!(process_id = %id, state = %tp.state(), "Already terminal, nothing to cancel");
            return Ok(report);
        }

        let from = tp.state();
        tp.transition_cancelled(command.reason(), self.clock.now_millis())?;
        self.store.save(&mut tp).await?;

        info!(
            process_id = %id,
            from = %from,
            reason = command.reason(),
            "Transfer process cancelled"
        );
        report.transitioned = 1;
        Ok(report)
    }
}

#[async_trait]
impl CommandHandler for CancelTransferProcessCommandHandler {
    fn accepted_type(&self) -> CommandType {
        CommandType::Cancel
    }

    async fn handle(&self, command: &Command) -> Result<HandleReport, CommandError> {
        match command {
            Command::Cancel(cmd) => self.cancel(cmd).await,
            other => Err(CommandError::UnexpectedCommand {
                expected: CommandType::Cancel,
                actual: other.command_type(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::process::{ProcessType, TransferProcess, TransferProcessState};
    use crate::store::InMemoryTransferProcessStore;
    use chrono::{TimeZone, Utc};

    fn setup() -> (
        Arc<InMemoryTransferProcessStore>,
        Arc<FixedClock>,
        CancelTransferProcessCommandHandler,
    ) {
        let store = Arc::new(InMemoryTransferProcessStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let handler = CancelTransferProcessCommandHandler::new(store.clone(), clock.clone());
        (store, clock, handler)
    }

    #[tokio::test]
    async fn test_cancel_active_process() {
        let (store, clock, handler) = setup();
        let mut tp = TransferProcess::new(ProcessType::Provider, "asset", 0);
        store.save(&mut tp).await.unwrap();

        let cmd = CancelTransferProcessCommand::new(tp.id(), "requested by user");
        let report = handler.handle(&cmd.into()).await.unwrap();
        assert_eq!(report.transitioned, 1);

        let stored = store.find_by_id(tp.id()).await.unwrap().unwrap();
        assert_eq!(stored.state(), TransferProcessState::Cancelled);
        assert_eq!(stored.error_detail(), Some("requested by user"));
        assert_eq!(stored.state_timestamp(), clock.now_millis());
    }

    #[tokio::test]
    async fn test_cancel_terminal_process_is_noop() {
        let (store, _clock, handler) = setup();
        let mut tp = TransferProcess::new(ProcessType::Provider, "asset", 0);
        tp.transition_error("failed earlier", 10).unwrap();
        store.save(&mut tp).await.unwrap();

        let cmd = CancelTransferProcessCommand::new(tp.id(), "too late");
        let report = handler.cancel(&cmd).await.unwrap();
        assert_eq!(report.transitioned, 0);

        let stored = store.find_by_id(tp.id()).await.unwrap().unwrap();
        assert_eq!(stored.state(), TransferProcessState::Error);
        assert_eq!(stored.version(), 1);
    }

    #[tokio::test]
    async fn test_cancel_unknown_process() {
        let (_store, _clock, handler) = setup();
        let id = TransferProcessId::new();

        let err = handler
            .cancel(&CancelTransferProcessCommand::new(id, "x"))
            .await
            .unwrap_err();
        assert_eq!(err, CommandError::Store(StoreError::NotFound(id)));
    }
}
