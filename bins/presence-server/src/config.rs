use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use presence_engine::{PresenceConfig, StoreKind, default_sweep_period};

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "presence-server", about = "Online presence по heartbeat'ам")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить сервер
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "presence.toml", env = "CONFIG_PATH")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Максимум id в одном batch запросе.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    #[serde(default)]
    pub presence: PresenceSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceSection {
    #[serde(default = "default_online_threshold_secs")]
    pub online_threshold_secs: u64,
    #[serde(default = "default_retention_window_secs")]
    pub retention_window_secs: u64,
    /// Период sweeper'а. По умолчанию retention / 3.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    #[serde(default)]
    pub store: StoreKind,
    /// Число shard'ов для `store = "sharded"`.
    #[serde(default)]
    pub shards: Option<usize>,
}

impl Default for PresenceSection {
    fn default() -> Self {
        Self {
            online_threshold_secs: default_online_threshold_secs(),
            retention_window_secs: default_retention_window_secs(),
            sweep_interval_secs: None,
            store: StoreKind::default(),
            shards: None,
        }
    }
}

fn default_api_port() -> u16 {
    9300
}
fn default_max_batch() -> usize {
    1000
}
fn default_online_threshold_secs() -> u64 {
    30
}
fn default_retention_window_secs() -> u64 {
    15 * 60
}

impl PresenceSection {
    pub fn engine_config(&self) -> PresenceConfig {
        PresenceConfig {
            online_threshold: Duration::from_secs(self.online_threshold_secs),
            retention_window: Duration::from_secs(self.retention_window_secs),
        }
    }

    pub fn sweep_period(&self) -> Duration {
        match self.sweep_interval_secs {
            Some(secs) => Duration::from_secs(secs),
            None => default_sweep_period(Duration::from_secs(self.retention_window_secs)),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Проверки, которые не выражаются через serde. Пороги presence
    /// валидирует сам `PresenceService`.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_batch == 0 {
            return Err(ServerError::Config { context: "max_batch", detail: "must be greater than zero".into() });
        }
        if self.presence.sweep_interval_secs == Some(0) {
            return Err(ServerError::Config {
                context: "presence.sweep_interval_secs",
                detail: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
