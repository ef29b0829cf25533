// group-core/src/config.rs

//! Configuration management for the group coordinator.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GroupError, Result};

/// Top-level coordinator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub store: StoreConfig,
    pub group: GroupConfig,
    /// Groups declared up front, registered locally at construction.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupDefinition>,
}

/// Shared store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// When false the coordinator skips leadership and heartbeats entirely.
    pub enabled: bool,
    /// Store connection URL (e.g. `redis://127.0.0.1:6379`).
    pub url: String,
    /// Logical database index selected before every operation.
    pub database: u32,
    /// Maximum number of clients lent out at once.
    pub pool_size: usize,
    /// How long `acquire` waits for a free client, in milliseconds.
    pub acquire_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://127.0.0.1:6379".to_string(),
            database: 0,
            pool_size: 8,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

// Key naming and heartbeat timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    // Base key; the leader record lives here and every other key derives from it.
    pub key: String,
    // Seconds between heartbeat ticks.
    pub heartbeat_interval_secs: u64,
    // Expiry of the ping record. Must exceed the interval.
    pub heartbeat_ttl_secs: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            key: "IMI.GROUP.KEY".to_string(),
            heartbeat_interval_secs: 5,
            heartbeat_ttl_secs: 8,
        }
    }
}

impl GroupConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl_secs)
    }
}

/// A group declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub name: String,
    /// Upper bound on recipients returned by `get_fds`; absent means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_clients: Option<usize>,
}

impl FromStr for CoordinatorConfig {
    type Err = GroupError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| GroupError::config_with_source("failed to parse TOML config", e))
    }
}

impl CoordinatorConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GroupError::config_with_source(
                format!("failed to read config file '{}'", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `GROUP_`:
    // - `GROUP_STORE_ENABLED`, `GROUP_STORE_URL`, `GROUP_STORE_DATABASE`
    // - `GROUP_STORE_POOL_SIZE`, `GROUP_STORE_ACQUIRE_TIMEOUT_MS`
    // - `GROUP_KEY`, `GROUP_HEARTBEAT_INTERVAL_SECS`, `GROUP_HEARTBEAT_TTL_SECS`
    //
    // Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Store overrides
        if let Ok(val) = std::env::var("GROUP_STORE_ENABLED") {
            if let Ok(v) = val.parse() {
                self.store.enabled = v;
            }
        }
        if let Ok(val) = std::env::var("GROUP_STORE_URL") {
            self.store.url = val;
        }
        if let Ok(val) = std::env::var("GROUP_STORE_DATABASE") {
            if let Ok(v) = val.parse() {
                self.store.database = v;
            }
        }
        if let Ok(val) = std::env::var("GROUP_STORE_POOL_SIZE") {
            if let Ok(v) = val.parse() {
                self.store.pool_size = v;
            }
        }
        if let Ok(val) = std::env::var("GROUP_STORE_ACQUIRE_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.store.acquire_timeout_ms = v;
            }
        }

        // Group overrides
        if let Ok(val) = std::env::var("GROUP_KEY") {
            self.group.key = val;
        }
        if let Ok(val) = std::env::var("GROUP_HEARTBEAT_INTERVAL_SECS") {
            if let Ok(v) = val.parse() {
                self.group.heartbeat_interval_secs = v;
            }
        }
        if let Ok(val) = std::env::var("GROUP_HEARTBEAT_TTL_SECS") {
            if let Ok(v) = val.parse() {
                self.group.heartbeat_ttl_secs = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        // Store validation
        if self.store.enabled && self.store.url.is_empty() {
            return Err(GroupError::config("store.url must not be empty"));
        }
        if self.store.pool_size == 0 {
            return Err(GroupError::config(
                "store.pool_size must be greater than 0",
            ));
        }
        if self.store.acquire_timeout_ms == 0 {
            return Err(GroupError::config(
                "store.acquire_timeout_ms must be greater than 0",
            ));
        }

        // Group validation
        if self.group.key.is_empty() {
            return Err(GroupError::config("group.key must not be empty"));
        }
        if self.group.heartbeat_interval_secs == 0 {
            return Err(GroupError::config(
                "group.heartbeat_interval_secs must be greater than 0",
            ));
        }
        if self.group.heartbeat_ttl_secs <= self.group.heartbeat_interval_secs {
            return Err(GroupError::config(format!(
                "group.heartbeat_ttl_secs ({}) must exceed group.heartbeat_interval_secs ({})",
                self.group.heartbeat_ttl_secs, self.group.heartbeat_interval_secs
            )));
        }

        // Declared groups
        let mut seen = HashSet::new();
        for def in &self.groups {
            if def.name.is_empty() {
                return Err(GroupError::config("groups[].name must not be empty"));
            }
            if !seen.insert(def.name.as_str()) {
                return Err(GroupError::config(format!(
                    "group '{}' is declared more than once",
                    def.name
                )));
            }
        }

        Ok(())
    }
}
