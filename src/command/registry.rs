//! Command handler registry
//!
//! Maps a command type to its handler. Built once at startup and shared
//! read-only afterwards.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use super::{
    CancelTransferProcessCommandHandler, CheckTimeoutCommandHandler, Command, CommandError,
    CommandHandler, CommandType, HandleReport,
};
use crate::clock::Clock;
use crate::store::TransferProcessStore;

#[derive(Default)]
pub struct CommandHandlerRegistry {
    handlers: FxHashMap<CommandType, Arc<dyn CommandHandler>>,
}

impl CommandHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler wired to `store` and `clock`
    pub fn with_default_handlers(
        store: Arc<dyn TransferProcessStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CommandError> {
        let mut registry = Self::new();
        registry.register(Arc::new(CheckTimeoutCommandHandler::new(
            store.clone(),
            clock.clone(),
        )))?;
        registry.register(Arc::new(CancelTransferProcessCommandHandler::new(
            store, clock,
        )))?;
        Ok(registry)
    }

    /// Register a handler under the type it accepts.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) -> Result<(), CommandError> {
        let command_type = handler.accepted_type();
        if self.handlers.contains_key(&command_type) {
            return Err(CommandError::DuplicateHandler(command_type));
        }
        self.handlers.insert(command_type, handler);
        debug!(command_type = %command_type, "Command handler registered");
        Ok(())
    }

    pub fn handler_for(&self, command_type: CommandType) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(&command_type)
    }

    /// Route a command to its handler
    pub async fn dispatch(&self, command: &Command) -> Result<HandleReport, CommandError> {
        let command_type = command.command_type();
        let handler = self
            .handler_for(command_type)
            .ok_or(CommandError::NoHandler(command_type))?;
        handler.handle(command).await
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::command::CancelTransferProcessCommand;
    use crate::process::TransferProcessId;

    struct CountingHandler {
        command_type: CommandType,
        calls: AtomicUsize,
    }

    impl CountingHandler {
        fn new(command_type: CommandType) -> Self {
            Self {
                command_type,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CommandHandler for CountingHandler {
        fn accepted_type(&self) -> CommandType {
            self.command_type
        }

        async fn handle(&self, _command: &Command) -> Result<HandleReport, CommandError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HandleReport::default())
        }
    }

    fn cancel_command() -> Command {
        CancelTransferProcessCommand::new(TransferProcessId::new(), "test").into()
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_type() {
        let cancel = Arc::new(CountingHandler::new(CommandType::Cancel));
        let timeout = Arc::new(CountingHandler::new(CommandType::CheckTimeout));

        let mut registry = CommandHandlerRegistry::new();
        registry.register(cancel.clone()).unwrap();
        registry.register(timeout.clone()).unwrap();
        assert_eq!(registry.len(), 2);

        registry.dispatch(&cancel_command()).await.unwrap();

        assert_eq!(cancel.calls.load(Ordering::SeqCst), 1);
        assert_eq!(timeout.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_without_handler() {
        let registry = CommandHandlerRegistry::new();
        assert!(registry.is_empty());

        let err = registry.dispatch(&cancel_command()).await.unwrap_err();
        assert_eq!(err, CommandError::NoHandler(CommandType::Cancel));
    }

    #[test]
    fn test_default_handlers_cover_every_command_type() {
        use crate::clock::SystemClock;
        use crate::store::InMemoryTransferProcessStore;

        let registry = CommandHandlerRegistry::with_default_handlers(
            Arc::new(InMemoryTransferProcessStore::new()),
            Arc::new(SystemClock),
        )
        .unwrap();

        for command_type in [CommandType::CheckTimeout, CommandType::Cancel] {
            let handler = registry.handler_for(command_type).unwrap();
            assert_eq!(handler.accepted_type(), command_type);
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = CommandHandlerRegistry::new();
        registry
            .register(Arc::new(CountingHandler::new(CommandType::Cancel)))
            .unwrap();

        let err = registry
            .register(Arc::new(CountingHandler::new(CommandType::Cancel)))
            .unwrap_err();
        assert_eq!(err, CommandError::DuplicateHandler(CommandType::Cancel));
    }
}
