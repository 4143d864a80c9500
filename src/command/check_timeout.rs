//! Timeout check (watchdog)
//!
//! Retires transfer processes that have been stuck in one state for longer
//! than a configured age by moving them to ERROR.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{Command, CommandError, CommandHandler, CommandType, HandleReport};
use crate::clock::Clock;
use crate::process::TransferProcessState;
use crate::store::TransferProcessStore;

/// Error detail recorded on processes retired by the watchdog
pub const TIMEOUT_ERROR_DETAIL: &str = "timeout by watchdog";

/// Scan `target_state` for processes older than `max_age`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTransferProcessTimeoutCommand {
    target_state: TransferProcessState,
    batch_size: usize,
    max_age: Duration,
}

impl CheckTransferProcessTimeoutCommand {
    /// Validated constructor. Bad values fail here, never inside `handle`.
    pub fn new(
        target_state: TransferProcessState,
        batch_size: usize,
        max_age: Duration,
    ) -> Result<Self, CommandError> {
        if batch_size == 0 {
            return Err(CommandError::InvalidCommand(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if target_state.is_terminal() {
            return Err(CommandError::InvalidCommand(format!(
                "cannot time out processes in terminal state {}",
                target_state
            )));
        }
        if i64::try_from(max_age.as_millis()).is_err() {
            return Err(CommandError::InvalidCommand(format!(
                "max_age {:?} is out of range",
                max_age
            )));
        }

        Ok(Self {
            target_state,
            batch_size,
            max_age,
        })
    }

    pub fn target_state(&self) -> TransferProcessState {
        self.target_state
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn max_age_millis(&self) -> i64 {
        // range checked in new()
        self.max_age.as_millis() as i64
    }
}

pub struct CheckTimeoutCommandHandler {
    store: Arc<dyn TransferProcessStore>,
    clock: Arc<dyn Clock>,
}

impl CheckTimeoutCommandHandler {
    pub fn new(store: Arc<dyn TransferProcessStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Run one timeout check.
    ///
    /// Each expired process is transitioned and saved on its own. Conflicts,
    /// vanished records and rejected transitions skip that process; a fatal
    /// store error aborts the rest of the batch and is returned.
    pub async fn check(
        &self,
        command: &CheckTransferProcessTimeoutCommand,
    ) -> Result<HandleReport, CommandError> {
        let target_state = command.target_state();
        let processes = self
            .store
            .next_for_state(target_state, command.batch_size())
            .await?;

        let mut report = HandleReport {
            scanned: processes.len(),
            ..HandleReport::default()
        };

        if processes.is_empty() {
            debug!(state = %target_state, "No transfer processes to check");
            return Ok(report);
        }

        let now = self.clock.now_millis();
        let cutoff = now.saturating_sub(command.max_age_millis());

        let expired = processes
            .into_iter()
            .filter(|tp| tp.state() == target_state && tp.state_timestamp() < cutoff);

        for mut tp in expired {
            info!(
                process_id = %tp.id(),
                state = %target_state,
                state_timestamp = tp.state_timestamp(),
                reason = TIMEOUT_ERROR_DETAIL,
                "Will retire transfer process due to timeout"
            );

            if let Err(e) = tp.transition_error(TIMEOUT_ERROR_DETAIL, now) {
                warn!(process_id = %tp.id(), error = %e, "Skipping transfer process");
                report.skipped += 1;
                continue;
            }

            match self.store.save(&mut tp).await {
                Ok(()) => report.transitioned += 1,
                Err(e) if e.is_fatal() => {
                    error!(
                        process_id = %tp.id(),
                        error = %e,
                        transitioned = report.transitioned,
                        "Store failure, aborting timeout check"
                    );
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(
                        process_id = %tp.id(),
                        error = %e,
                        "Transfer process changed concurrently, skipping"
                    );
                    report.skipped += 1;
                }
            }
        }

        if report.transitioned > 0 {
            info!(
                state = %target_state,
                count = report.transitioned,
                "Retired timed out transfer processes"
            );
        }

        Ok(report)
    }
}

#[async_trait]
impl CommandHandler for CheckTimeoutCommandHandler {
    fn accepted_type(&self) -> CommandType {
        CommandType::CheckTimeout
    }

    async fn handle(&self, command: &Command) -> Result<HandleReport, CommandError> {
        match command {
            Command::CheckTimeout(cmd) => self.check(cmd).await,
            other => Err(CommandError::UnexpectedCommand {
                expected: CommandType::CheckTimeout,
                actual: other.command_type(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::command::CancelTransferProcessCommand;
    use crate::process::{ProcessType, TransferProcess, TransferProcessId};
    use crate::store::{InMemoryTransferProcessStore, StoreError};
    use chrono::{TimeZone, Utc};

    const HOUR: Duration = Duration::from_secs(3600);

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ))
    }

    async fn seed_requested(store: &InMemoryTransferProcessStore, at: i64) -> TransferProcessId {
        let mut tp = TransferProcess::new(ProcessType::Consumer, "asset", at);
        for next in [
            TransferProcessState::Provisioning,
            TransferProcessState::Provisioned,
            TransferProcessState::Requesting,
            TransferProcessState::Requested,
        ] {
            tp.transition_to(next, at).unwrap();
        }
        store.save(&mut tp).await.unwrap();
        tp.id()
    }

    #[test]
    fn test_command_validation() {
        assert!(
            CheckTransferProcessTimeoutCommand::new(TransferProcessState::Requested, 10, HOUR)
                .is_ok()
        );

        let zero_batch =
            CheckTransferProcessTimeoutCommand::new(TransferProcessState::Requested, 0, HOUR);
        assert!(matches!(zero_batch, Err(CommandError::InvalidCommand(_))));

        let terminal =
            CheckTransferProcessTimeoutCommand::new(TransferProcessState::Error, 10, HOUR);
        assert!(matches!(terminal, Err(CommandError::InvalidCommand(_))));

        let huge = CheckTransferProcessTimeoutCommand::new(
            TransferProcessState::Requested,
            10,
            Duration::MAX,
        );
        assert!(matches!(huge, Err(CommandError::InvalidCommand(_))));
    }

    #[test]
    fn test_every_checkable_state_can_be_retired() {
        for state in TransferProcessState::ALL {
            let accepted = CheckTransferProcessTimeoutCommand::new(state, 1, HOUR).is_ok();
            assert_eq!(accepted, !state.is_terminal());
            if accepted {
                assert!(state.can_transition_to(TransferProcessState::Error));
            }
        }
    }

    #[tokio::test]
    async fn test_expired_process_moves_to_error() {
        let store = Arc::new(InMemoryTransferProcessStore::new());
        let clock = clock();
        let now = clock.now_millis();
        let stale = seed_requested(&store, now - 2 * 3_600_000).await;
        let fresh = seed_requested(&store, now - 30 * 60_000).await;

        let handler = CheckTimeoutCommandHandler::new(store.clone(), clock.clone());
        let cmd =
            CheckTransferProcessTimeoutCommand::new(TransferProcessState::Requested, 10, HOUR)
                .unwrap();
        let report = handler.handle(&cmd.into()).await.unwrap();

        assert_eq!(
            report,
            HandleReport {
                scanned: 2,
                transitioned: 1,
                skipped: 0
            }
        );

        let stale = store.find_by_id(stale).await.unwrap().unwrap();
        assert_eq!(stale.state(), TransferProcessState::Error);
        assert_eq!(stale.error_detail(), Some(TIMEOUT_ERROR_DETAIL));
        assert_eq!(stale.state_timestamp(), now);

        let fresh = store.find_by_id(fresh).await.unwrap().unwrap();
        assert_eq!(fresh.state(), TransferProcessState::Requested);
        assert_eq!(fresh.version(), 1);
    }

    #[tokio::test]
    async fn test_exactly_max_age_is_not_expired() {
        let store = Arc::new(InMemoryTransferProcessStore::new());
        let clock = clock();
        let id = seed_requested(&store, clock.now_millis() - 3_600_000).await;

        let handler = CheckTimeoutCommandHandler::new(store.clone(), clock.clone());
        let cmd =
            CheckTransferProcessTimeoutCommand::new(TransferProcessState::Requested, 10, HOUR)
                .unwrap();
        let report = handler.check(&cmd).await.unwrap();

        assert_eq!(report.transitioned, 0);
        let tp = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(tp.state(), TransferProcessState::Requested);
    }

    #[tokio::test]
    async fn test_rejects_other_command_types() {
        let store = Arc::new(InMemoryTransferProcessStore::new());
        let handler = CheckTimeoutCommandHandler::new(store, clock());
        let cancel = CancelTransferProcessCommand::new(TransferProcessId::new(), "user");

        let err = handler.handle(&cancel.into()).await.unwrap_err();
        assert_eq!(
            err,
            CommandError::UnexpectedCommand {
                expected: CommandType::CheckTimeout,
                actual: CommandType::Cancel,
            }
        );
    }

    #[tokio::test]
    async fn test_store_unavailable_is_surfaced() {
        struct DownStore;

        #[async_trait]
        impl TransferProcessStore for DownStore {
            async fn find_by_id(
                &self,
                _id: TransferProcessId,
            ) -> Result<Option<TransferProcess>, StoreError> {
                Err(StoreError::Unavailable("connection refused".into()))
            }

            async fn next_for_state(
                &self,
                _state: TransferProcessState,
                _batch_size: usize,
            ) -> Result<Vec<TransferProcess>, StoreError> {
                Err(StoreError::Unavailable("connection refused".into()))
            }

            async fn save(&self, _process: &mut TransferProcess) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("connection refused".into()))
            }
        }

        let handler = CheckTimeoutCommandHandler::new(Arc::new(DownStore), clock());
        let cmd =
            CheckTransferProcessTimeoutCommand::new(TransferProcessState::Requested, 10, HOUR)
                .unwrap();

        let err = handler.check(&cmd).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
    }
}
