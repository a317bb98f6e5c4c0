use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::storage::StoreOptions;

pub const DEFAULT_DATABASE: &str = "fiscus.db";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// Log output format for the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("unknown log format '{}'", other)),
        }
    }
}

/// Runtime settings, read from `FISCUS_*` environment variables.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub database: String,
    pub lock_timeout: Duration,
    pub max_connections: u32,
    pub bind: SocketAddr,
    pub log_format: LogFormat,
}

impl LedgerConfig {
    /// Load from the process environment. Call `dotenv::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key lookup; unset keys fall back to defaults, malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database = lookup("FISCUS_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let lock_timeout = match lookup("FISCUS_LOCK_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .with_context(|| format!("FISCUS_LOCK_TIMEOUT_MS is not a number: {}", raw))?,
            ),
            None => DEFAULT_LOCK_TIMEOUT,
        };

        let max_connections: u32 = match lookup("FISCUS_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("FISCUS_MAX_CONNECTIONS is not a number: {}", raw))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err(anyhow!("FISCUS_MAX_CONNECTIONS must be at least 1"));
        }

        let bind: SocketAddr = lookup("FISCUS_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("FISCUS_BIND is not a socket address")?;

        let log_format = match lookup("FISCUS_LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            database,
            lock_timeout,
            max_connections,
            bind,
            log_format,
        })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.database)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::new(self.database_url())
            .with_lock_timeout(self.lock_timeout)
            .with_max_connections(self.max_connections)
    }
}
