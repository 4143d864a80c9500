//! Transfer Watchdog - durable transfer process state machine
//!
//! Keeps transfer processes of a data-transfer connector moving by retiring
//! the ones stuck in a state for too long.
//!
//! # Modules
//!
//! - [`process`] - Transfer process entity and lifecycle states
//! - [`store`] - Store trait with in-memory and PostgreSQL implementations
//! - [`clock`] - Injected time source
//! - [`command`] - Commands, handlers and the handler registry
//! - [`runner`] - Periodic and queued command dispatch, shutdown
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`db`] - PostgreSQL connection pool

pub mod clock;
pub mod command;
pub mod config;
pub mod db;
pub mod logging;
pub mod process;
pub mod runner;
pub mod store;

// Convenient re-exports at crate root
pub use clock::{Clock, FixedClock, SystemClock};
pub use command::{
    CancelTransferProcessCommand, CheckTimeoutCommandHandler, CheckTransferProcessTimeoutCommand,
    Command, CommandError, CommandHandler, CommandHandlerRegistry, CommandType, HandleReport,
};
pub use process::{ProcessType, TransferProcess, TransferProcessId, TransferProcessState};
pub use runner::{CommandQueue, CommandRunner, RunnerConfig, ShutdownSignal};
pub use store::{
    InMemoryTransferProcessStore, PgTransferProcessStore, StoreError, TransferProcessStore,
};
