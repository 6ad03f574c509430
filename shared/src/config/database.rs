//! Database configuration module

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::secrets::mask_url_password;

/// Connection pool and session settings for the relational store
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,

    /// Connections kept in the pool (capacity)
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Extra connections allowed beyond `pool_size` under load
    #[serde(default = "default_max_overflow")]
    pub max_overflow: u32,

    /// How long `acquire` waits for a free connection, in milliseconds
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Connections older than this are discarded instead of reused, in
    /// milliseconds; 0 keeps connections indefinitely
    #[serde(default = "default_pool_recycle_ms")]
    pub pool_recycle_ms: u64,

    /// Idle connections are closed after this many seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Probe reused connections before handing them out
    #[serde(default = "default_pool_pre_ping")]
    pub pool_pre_ping: bool,

    /// Per-statement timeout applied to every new connection, in seconds
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,

    /// Log every SQL statement at INFO instead of DEBUG
    #[serde(default)]
    pub echo: bool,

    /// Slow query threshold in milliseconds
    #[serde(default = "default_slow_query_threshold_ms")]
    pub slow_query_threshold_ms: u64,

    /// Server-side session settings applied to each new connection
    #[serde(default)]
    pub server_settings: BTreeMap<String, String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::from("sqlite://keystone.db?mode=rwc"),
            pool_size: default_pool_size(),
            max_overflow: default_max_overflow(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            pool_recycle_ms: default_pool_recycle_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            pool_pre_ping: default_pool_pre_ping(),
            statement_timeout_secs: default_statement_timeout_secs(),
            echo: false,
            slow_query_threshold_ms: default_slow_query_threshold_ms(),
            server_settings: BTreeMap::new(),
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration with URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the pool capacity
    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the overflow limit
    pub fn with_max_overflow(mut self, overflow: u32) -> Self {
        self.max_overflow = overflow;
        self
    }

    /// Set the acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = round_up_millis(timeout);
        self
    }

    /// Set the connection recycle age; sub-millisecond ages round up to 1ms
    pub fn with_recycle(mut self, age: Duration) -> Self {
        self.pool_recycle_ms = round_up_millis(age);
        self
    }

    /// Enable or disable the pre-use liveness probe
    pub fn with_pre_ping(mut self, enabled: bool) -> Self {
        self.pool_pre_ping = enabled;
        self
    }

    /// Enable SQL statement echo
    pub fn with_echo(mut self, enable: bool) -> Self {
        self.echo = enable;
        self
    }

    /// Add a server-side session setting
    pub fn with_server_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.server_settings.insert(key.into(), value.into());
        self
    }

    /// Maximum number of connections checked out at once
    pub fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn recycle_age(&self) -> Duration {
        Duration::from_millis(self.pool_recycle_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }

    /// Connection URL with the password replaced by `***`
    pub fn masked_url(&self) -> String {
        mask_url_password(&self.url)
    }

    /// Check the settings that would make a pool unusable
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("database url is required but not provided".to_string());
        }
        if self.pool_size == 0 {
            return Err("database pool_size must be at least 1".to_string());
        }
        Ok(())
    }
}

fn default_pool_size() -> u32 {
    20
}

fn default_max_overflow() -> u32 {
    40
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

fn default_pool_recycle_ms() -> u64 {
    3_600_000
}

// Zero stays zero; any other duration keeps at least one millisecond
fn round_up_millis(duration: Duration) -> u64 {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 && !duration.is_zero() {
        1
    } else {
        millis
    }
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_pool_pre_ping() -> bool {
    true
}

fn default_statement_timeout_secs() -> u64 {
    60
}

fn default_slow_query_threshold_ms() -> u64 {
    1000 // 1 second
}
