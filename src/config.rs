use std::{collections::HashMap, env, time::Duration};

use config::{Config, Environment};
use serde::Deserialize;
use thiserror::Error;

use crate::processor::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// `None` runs the ledger on the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("Invalid value `{value}` for {var}")]
    Invalid { var: &'static str, value: String },
}

/// Flat view of the `LEDGER_*` variables, `DATABASE_URL` included.
#[derive(Debug, Deserialize)]
struct Settings {
    database_url: Option<String>,
    db_max_connections: u32,
    db_acquire_timeout_secs: u64,
    retry_max_attempts: u32,
    retry_backoff_ms: u64,
    log_level: String,
    log_json: bool,
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

impl LedgerConfig {
    /// Reads the process environment after loading `.env` when there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load(None)
    }

    /// Reads `vars` in place of the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let database_url = match &vars {
            Some(vars) => vars.get("DATABASE_URL").cloned(),
            None => env::var("DATABASE_URL").ok(),
        };

        let settings: Settings = Config::builder()
            .set_default("db_max_connections", 10)?
            .set_default("db_acquire_timeout_secs", 5)?
            .set_default("retry_max_attempts", 3)?
            .set_default("retry_backoff_ms", 50)?
            .set_default("log_level", "info")?
            .set_default("log_json", false)?
            .add_source(
                Environment::with_prefix("LEDGER")
                    .prefix_separator("_")
                    .try_parsing(true)
                    .source(vars),
            )
            .set_override_option(
                "database_url",
                database_url.filter(|url| !url.trim().is_empty()),
            )?
            .build()?
            .try_deserialize()?;

        if settings.retry_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "LEDGER_RETRY_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database: settings.database_url.map(|url| DatabaseConfig {
                url,
                max_connections: settings.db_max_connections,
                acquire_timeout_secs: settings.db_acquire_timeout_secs,
            }),
            retry: RetryConfig {
                max_attempts: settings.retry_max_attempts,
                backoff_ms: settings.retry_backoff_ms,
            },
            logging: LoggingConfig {
                level: settings.log_level,
                json: settings.log_json,
            },
        })
    }
}
