use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::command::{CheckTransferProcessTimeoutCommand, CommandError};
use crate::process::TransferProcessState;
use crate::runner::RunnerConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Let sqlx log at `log_level`; otherwise it is capped at warn
    #[serde(default)]
    pub log_sql: bool,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default)]
    pub watchdogs: Vec<WatchdogConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// PostgreSQL URL; the in-memory store is used when absent
    #[serde(default)]
    pub postgres_url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            max_connections: 5,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunnerSettings {
    pub queue_size: usize,
    pub max_retries: u32,
    /// Pause before a failed queued command is attempted again
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_retry_delay_ms() -> u64 {
    RunnerConfig::default().retry_delay.as_millis() as u64
}

impl Default for RunnerSettings {
    fn default() -> Self {
        let defaults = RunnerConfig::default();
        Self {
            queue_size: defaults.queue_size,
            max_retries: defaults.max_retries,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
        }
    }
}

impl From<&RunnerSettings> for RunnerConfig {
    fn from(settings: &RunnerSettings) -> Self {
        RunnerConfig {
            queue_size: settings.queue_size,
            max_retries: settings.max_retries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

/// One periodic timeout check
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchdogConfig {
    pub target_state: TransferProcessState,
    pub interval_ms: u64,
    pub batch_size: usize,
    pub max_age_secs: u64,
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Build the validated command this watchdog issues on every tick
    pub fn to_command(&self) -> Result<CheckTransferProcessTimeoutCommand, CommandError> {
        CheckTransferProcessTimeoutCommand::new(
            self.target_state,
            self.batch_size,
            Duration::from_secs(self.max_age_secs),
        )
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config: {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(content).context("Failed to parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject watchdogs that could never run
    pub fn validate(&self) -> Result<()> {
        for (idx, watchdog) in self.watchdogs.iter().enumerate() {
            if watchdog.interval_ms == 0 {
                anyhow::bail!("watchdogs[{}]: interval_ms must be greater than zero", idx);
            }
            watchdog
                .to_command()
                .with_context(|| format!("watchdogs[{}]", idx))?;
        }
        Ok(())
    }
}
