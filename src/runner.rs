//! Command Runner
//!
//! Drives handlers on a cadence and drains the ad-hoc command queue.
//!
//! ```text
//! ┌────────────┐ tick  ┌────────────┐        ┌─────────┐
//! │ schedule 1 │──────▶│            │        │         │
//! ├────────────┤       │ Dispatcher │───────▶│ Handler │───▶ Store
//! │ schedule N │──────▶│ (per-type  │        │         │
//! ├────────────┤       │   lock)    │        └─────────┘
//! │   queue    │──────▶│            │
//! └────────────┘       └────────────┘
//! ```
//!
//! Invocations of the same command type are serialized: however many
//! schedules and queued commands target one handler, at most one of them is
//! in flight. Shutdown stops new ticks; an invocation already running
//! finishes. Commands still queued at shutdown are dropped and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandError, CommandHandlerRegistry, CommandType, HandleReport};

// ============================================================================
// Shutdown
// ============================================================================

/// Cooperative shutdown flag shared by all runner tasks
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    shutdown: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if shutdown was requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_shutdown_requested() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Capacity of the ad-hoc command queue
    pub queue_size: usize,
    /// Attempts for a queued command whose failure is retryable
    pub max_retries: u32,
    /// Pause before a failed queued command is attempted again
    pub retry_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            queue_size: 256,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// A command re-issued every `interval`
#[derive(Debug, Clone)]
pub struct ScheduledCommand {
    pub command: Command,
    pub interval: Duration,
}

// ============================================================================
// Ad-hoc Queue
// ============================================================================

#[derive(Debug)]
struct QueuedCommand {
    command: Command,
    attempts: u32,
}

/// Sender side of the runner's command queue
#[derive(Clone)]
pub struct CommandQueue {
    tx: mpsc::Sender<QueuedCommand>,
}

impl CommandQueue {
    /// Queue a command for the runner, waiting for capacity
    pub async fn enqueue(&self, command: Command) -> Result<(), CommandError> {
        self.tx
            .send(QueuedCommand {
                command,
                attempts: 0,
            })
            .await
            .map_err(|_| CommandError::QueueClosed)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Registry access shared by every runner task, one lock per command type
struct Dispatcher {
    registry: Arc<CommandHandlerRegistry>,
    in_flight: FxHashMap<CommandType, Mutex<()>>,
}

impl Dispatcher {
    fn new(registry: Arc<CommandHandlerRegistry>) -> Self {
        let in_flight = CommandType::ALL
            .into_iter()
            .map(|command_type| (command_type, Mutex::new(())))
            .collect();
        Self {
            registry,
            in_flight,
        }
    }

    /// Run `command` once no other invocation of its type is in flight.
    ///
    /// Returns `None` if shutdown is requested before the lock is taken.
    async fn dispatch(
        &self,
        command: &Command,
        shutdown: &ShutdownSignal,
    ) -> Option<Result<HandleReport, CommandError>> {
        let command_type = command.command_type();
        let Some(lock) = self.in_flight.get(&command_type) else {
            return Some(Err(CommandError::NoHandler(command_type)));
        };

        let _guard = tokio::select! {
            biased;
            _ = shutdown.wait() => return None,
            guard = lock.lock() => guard,
        };
        Some(self.registry.dispatch(command).await)
    }
}

// ============================================================================
// Runner
// ============================================================================

pub struct CommandRunner {
    registry: Arc<CommandHandlerRegistry>,
    config: RunnerConfig,
    schedules: Vec<ScheduledCommand>,
    queue_tx: mpsc::Sender<QueuedCommand>,
    queue_rx: mpsc::Receiver<QueuedCommand>,
}

impl CommandRunner {
    pub fn new(
        registry: Arc<CommandHandlerRegistry>,
        config: RunnerConfig,
    ) -> (Self, CommandQueue) {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_size.max(1));
        let queue = CommandQueue {
            tx: queue_tx.clone(),
        };

        let runner = Self {
            registry,
            config,
            schedules: Vec::new(),
            queue_tx,
            queue_rx,
        };
        (runner, queue)
    }

    /// Add a periodic command. Fails if no handler accepts it.
    pub fn schedule(&mut self, command: Command, interval: Duration) -> Result<(), CommandError> {
        let command_type = command.command_type();
        if self.registry.handler_for(command_type).is_none() {
            return Err(CommandError::NoHandler(command_type));
        }
        if interval.is_zero() {
            return Err(CommandError::InvalidCommand(format!(
                "schedule interval for {} must be greater than zero",
                command_type
            )));
        }

        self.schedules.push(ScheduledCommand { command, interval });
        Ok(())
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.len()
    }

    /// Run until `shutdown` is requested and every task has stopped
    pub async fn run(self, shutdown: Arc<ShutdownSignal>) {
        info!(
            schedules = self.schedules.len(),
            queue_size = self.config.queue_size,
            max_retries = self.config.max_retries,
            retry_delay_ms = self.config.retry_delay.as_millis() as u64,
            "Starting command runner"
        );

        let dispatcher = Arc::new(Dispatcher::new(self.registry));
        let mut tasks = JoinSet::new();

        for scheduled in self.schedules {
            tasks.spawn(run_schedule(
                dispatcher.clone(),
                scheduled,
                shutdown.clone(),
            ));
        }

        tasks.spawn(run_queue(
            dispatcher,
            self.queue_rx,
            self.queue_tx,
            self.config,
            shutdown,
        ));

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Runner task panicked");
            }
        }

        info!("Command runner stopped");
    }
}

async fn run_schedule(
    dispatcher: Arc<Dispatcher>,
    scheduled: ScheduledCommand,
    shutdown: Arc<ShutdownSignal>,
) {
    let command_type = scheduled.command.command_type();
    let mut ticker = tokio::time::interval(scheduled.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        command_type = %command_type,
        interval_ms = scheduled.interval.as_millis() as u64,
        "Schedule started"
    );

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {}
        }

        let Some(result) = dispatcher.dispatch(&scheduled.command, &shutdown).await else {
            break;
        };

        match result {
            Ok(report) => debug!(
                command_type = %command_type,
                scanned = report.scanned,
                transitioned = report.transitioned,
                skipped = report.skipped,
                "Scheduled command completed"
            ),
            // retried by cadence on the next tick
            Err(e) => error!(
                command_type = %command_type,
                code = e.code(),
                error = %e,
                "Scheduled command failed"
            ),
        }
    }

    info!(command_type = %command_type, "Schedule stopped");
}

async fn run_queue(
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::Receiver<QueuedCommand>,
    retry_tx: mpsc::Sender<QueuedCommand>,
    config: RunnerConfig,
    shutdown: Arc<ShutdownSignal>,
) {
    // failed commands waiting out `retry_delay` before going back on the queue
    let mut retries: JoinSet<()> = JoinSet::new();
    let mut dropped = 0usize;

    loop {
        let mut queued = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            Some(_) = retries.join_next(), if !retries.is_empty() => continue,
            next = rx.recv() => match next {
                Some(queued) => queued,
                None => break,
            },
        };

        let command_type = queued.command.command_type();
        queued.attempts += 1;

        let Some(result) = dispatcher.dispatch(&queued.command, &shutdown).await else {
            dropped += 1;
            break;
        };

        match result {
            Ok(report) => debug!(
                command_type = %command_type,
                transitioned = report.transitioned,
                "Queued command completed"
            ),
            Err(e) if e.is_retryable() && queued.attempts < config.max_retries => {
                warn!(
                    command_type = %command_type,
                    attempts = queued.attempts,
                    retry_delay_ms = config.retry_delay.as_millis() as u64,
                    error = %e,
                    "Queued command failed, retrying after delay"
                );
                let retry_tx = retry_tx.clone();
                let delay = config.retry_delay;
                retries.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if retry_tx.send(queued).await.is_err() {
                        error!(command_type = %command_type, "Command queue closed, dropping retry");
                    }
                });
            }
            Err(e) => error!(
                command_type = %command_type,
                attempts = queued.attempts,
                code = e.code(),
                error = %e,
                "Queued command failed"
            ),
        }
    }

    retries.abort_all();
    while let Some(result) = retries.join_next().await {
        if matches!(result, Err(e) if e.is_cancelled()) {
            dropped += 1;
        }
    }
    while rx.try_recv().is_ok() {
        dropped += 1;
    }

    if dropped > 0 {
        warn!(dropped, "Command queue stopped with unprocessed commands");
    } else {
        info!("Command queue stopped");
    }
}
