//! Configuration management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SYNC_CRON;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Document store holding the execution log.
    pub event_log: DatabaseConfig,
    /// Relational store holding tier aggregates and pricing.
    pub metadata: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Sync cycle and trigger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether the periodic trigger runs at all.
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub cron_expression: String,
    /// Pending entries fetched per page.
    pub page_size: usize,
    /// Entries processed concurrently within one cycle.
    pub max_concurrent_entries: usize,
    pub entry_timeout_secs: u64,
    pub cycle_timeout_secs: u64,
    /// Directory holding the cross-process cycle lock.
    pub lock_dir: String,
}

impl SyncConfig {
    pub fn entry_timeout(&self) -> Duration {
        Duration::from_secs(self.entry_timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_expression: DEFAULT_SYNC_CRON.to_string(),
            page_size: 100,
            max_concurrent_entries: 4,
            entry_timeout_secs: 30,
            cycle_timeout_secs: 900,
            lock_dir: std::env::temp_dir().to_string_lossy().into_owned(),
        }
    }
}

fn default_pool_size() -> u32 {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_log: DatabaseConfig {
                path: "metasync-events.db".to_string(),
                pool_size: default_pool_size(),
            },
            metadata: DatabaseConfig {
                path: "metasync-metadata.db".to_string(),
                pool_size: default_pool_size(),
            },
            sync: SyncConfig::default(),
        }
    }
}
