//! Gateway configuration.
//!
//! Read once at startup; nothing here changes while the gateway runs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlgate_core::PolicyConfig;

use crate::error::{GatewayError, Result};

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Database URL, e.g. `sqlite:db.sqlite3`.
    pub database_url: String,
    /// Upper bound on open connections.
    pub max_connections: u32,
    /// How long a request waits for a free connection.
    pub acquire_timeout_ms: u64,
    /// Execution time limit per query; `None` disables it.
    pub execute_timeout_ms: Option<u64>,
    /// Open the database read-only.
    pub read_only: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:db.sqlite3".to_string(),
            max_connections: 5,
            acquire_timeout_ms: 5_000,
            execute_timeout_ms: Some(30_000),
            read_only: false,
        }
    }
}

impl PoolConfig {
    /// Sets the database URL.
    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Sets the connection limit.
    #[must_use]
    pub const fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the acquire timeout.
    #[must_use]
    pub const fn acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }

    /// Sets the execution timeout.
    #[must_use]
    pub const fn execute_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.execute_timeout_ms = ms;
        self
    }

    /// Opens the database read-only.
    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Acquire timeout as a duration.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Execution timeout as a duration.
    #[must_use]
    pub fn execute_timeout(&self) -> Option<Duration> {
        self.execute_timeout_ms.map(Duration::from_millis)
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// What may run.
    pub policy: PolicyConfig,
    /// Where it runs.
    pub pool: PoolConfig,
}

impl GatewayConfig {
    /// Parses configuration from JSON. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| GatewayError::Config(format!("{}: {e}", path.display())))
    }
}
