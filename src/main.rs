//! Transfer Watchdog service
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│  Runner  │───▶│ Handlers │───▶│  Store   │
//! │  (YAML)  │    │ (ticks)  │    │(watchdog)│    │(PG / mem)│
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use transfer_watchdog::clock::{Clock, SystemClock};
use transfer_watchdog::command::CommandHandlerRegistry;
use transfer_watchdog::config::{AppConfig, StoreConfig};
use transfer_watchdog::db::Database;
use transfer_watchdog::logging::init_logging;
use transfer_watchdog::runner::{CommandRunner, ShutdownSignal};
use transfer_watchdog::store::{
    InMemoryTransferProcessStore, PgTransferProcessStore, TransferProcessStore,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

async fn open_store(config: &StoreConfig) -> Result<Arc<dyn TransferProcessStore>> {
    let Some(db) = Database::from_config(config)
        .await
        .context("Failed to connect to PostgreSQL")?
    else {
        warn!("No postgres_url configured, using in-memory store (state is lost on exit)");
        return Ok(Arc::new(InMemoryTransferProcessStore::new()));
    };

    db.health_check()
        .await
        .context("PostgreSQL health check failed")?;

    let store = PgTransferProcessStore::new(db.pool().clone());
    if config.run_migrations {
        store.migrate().await.context("Schema migration failed")?;
    }
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&config);

    info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "Starting transfer watchdog"
    );

    let store = open_store(&config.store).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = CommandHandlerRegistry::with_default_handlers(store, clock)?;

    let (mut runner, _queue) = CommandRunner::new(Arc::new(registry), (&config.runner).into());
    for watchdog in &config.watchdogs {
        runner.schedule(watchdog.to_command()?.into(), watchdog.interval())?;
        info!(
            target_state = %watchdog.target_state,
            interval_ms = watchdog.interval_ms,
            batch_size = watchdog.batch_size,
            max_age_secs = watchdog.max_age_secs,
            "Watchdog scheduled"
        );
    }
    if config.watchdogs.is_empty() {
        warn!("No watchdogs configured");
    }

    let shutdown = Arc::new(ShutdownSignal::new());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                shutdown.request_shutdown();
            }
        }
    });

    runner.run(shutdown).await;
    Ok(())
}
