//! Connection client configuration.
//!
//! # Invariants
//! - Only SQLite drivers are executable; other driver names are rejected at
//!   client construction.
//! - `:memory:` DSNs use a single pooled connection that is never recycled,
//!   since every SQLite in-memory connection is its own database.

use super::dialect::Dialect;
use super::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MEMORY_DSN: &str = ":memory:";

const DEFAULT_MAX_OPEN: u32 = 8;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5_000;

/// Pool and driver settings injected by the bootstrap layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Driver name, e.g. `sqlite` or `sqlite3`.
    pub driver: String,
    /// File path, `file:` URI, or `:memory:`.
    pub dsn: String,
    /// Upper bound of pooled connections.
    pub max_open: u32,
    /// Connections kept open while idle.
    pub min_idle: u32,
    /// Maximum lifetime of one pooled connection.
    pub max_lifetime_secs: Option<u64>,
    /// Idle connections above `min_idle` are closed after this long.
    pub idle_timeout_secs: Option<u64>,
    /// How long a caller waits for a free connection.
    pub connect_timeout_secs: u64,
    /// SQLite busy handler timeout applied to every connection.
    pub busy_timeout_ms: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            dsn: MEMORY_DSN.to_string(),
            max_open: DEFAULT_MAX_OPEN,
            min_idle: 0,
            max_lifetime_secs: None,
            idle_timeout_secs: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    /// File-backed SQLite configuration with default pool bounds.
    pub fn sqlite(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn is_memory(&self) -> bool {
        let dsn = self.dsn.trim();
        dsn == MEMORY_DSN || dsn.contains("mode=memory")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.busy_timeout_ms))
    }

    /// Validates bounds and resolves the placeholder dialect of the driver.
    ///
    /// # Errors
    /// - `UnsupportedDriver` when the driver is not a SQLite driver.
    /// - `InvalidConfig` when the DSN is empty or pool bounds are inconsistent.
    pub fn validate(&self) -> DbResult<Dialect> {
        let driver = self.driver.trim().to_ascii_lowercase();
        if !matches!(driver.as_str(), "sqlite" | "sqlite3") {
            return Err(DbError::UnsupportedDriver(self.driver.clone()));
        }
        let dialect =
            Dialect::from_driver(&driver).ok_or_else(|| DbError::UnsupportedDriver(driver.clone()))?;

        if self.dsn.trim().is_empty() {
            return Err(DbError::InvalidConfig("dsn cannot be empty".to_string()));
        }
        if self.max_open == 0 {
            return Err(DbError::InvalidConfig(
                "max_open must be at least 1".to_string(),
            ));
        }
        if self.min_idle > self.max_open {
            return Err(DbError::InvalidConfig(format!(
                "min_idle {} exceeds max_open {}",
                self.min_idle, self.max_open
            )));
        }

        Ok(dialect)
    }
}
