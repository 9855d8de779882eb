//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the required variables are missing, falls back to a file
//! 3. Searches multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `METASYNC_EVENT_LOG_PATH`: Execution log database path (required)
//! - `METASYNC_METADATA_PATH`: Metadata database path (required)
//! - `METASYNC_DB_POOL_SIZE`: Connection pool size of both databases
//! - `METASYNC_SYNC_ENABLED`: Whether the periodic trigger runs (true/false)
//! - `METASYNC_SYNC_CRON`: Six-field cron expression of the trigger
//! - `METASYNC_SYNC_PAGE_SIZE`: Pending entries fetched per page
//! - `METASYNC_SYNC_MAX_CONCURRENT`: Entries processed concurrently
//! - `METASYNC_SYNC_ENTRY_TIMEOUT`: Per-entry timeout in seconds
//! - `METASYNC_SYNC_CYCLE_TIMEOUT`: Per-cycle timeout in seconds
//! - `METASYNC_LOCK_DIR`: Directory of the cross-process cycle lock
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./config.{json,toml}` and `./metasync.{json,toml}`
//! 2. The same names in the parent and grandparent directories
//! 3. The same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use metasync_domain::{Config, DatabaseConfig, MetaSyncError, Result, SyncConfig};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["config.json", "config.toml", "metasync.json", "metasync.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `MetaSyncError::Config` if neither source yields a valid
/// configuration.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// Only the two database paths are required; every other setting falls back
/// to its default.
///
/// # Errors
/// Returns `MetaSyncError::Config` if a required variable is missing or a
/// numeric variable does not parse.
pub fn load_from_env() -> Result<Config> {
    let event_log_path = env_var("METASYNC_EVENT_LOG_PATH")?;
    let metadata_path = env_var("METASYNC_METADATA_PATH")?;
    let pool_size = env_parse("METASYNC_DB_POOL_SIZE", 4_u32)?;

    let defaults = SyncConfig::default();
    let sync = SyncConfig {
        enabled: env_bool("METASYNC_SYNC_ENABLED", defaults.enabled),
        cron_expression: std::env::var("METASYNC_SYNC_CRON")
            .unwrap_or_else(|_| defaults.cron_expression.clone()),
        page_size: env_parse("METASYNC_SYNC_PAGE_SIZE", defaults.page_size)?,
        max_concurrent_entries: env_parse(
            "METASYNC_SYNC_MAX_CONCURRENT",
            defaults.max_concurrent_entries,
        )?,
        entry_timeout_secs: env_parse("METASYNC_SYNC_ENTRY_TIMEOUT", defaults.entry_timeout_secs)?,
        cycle_timeout_secs: env_parse("METASYNC_SYNC_CYCLE_TIMEOUT", defaults.cycle_timeout_secs)?,
        lock_dir: std::env::var("METASYNC_LOCK_DIR").unwrap_or(defaults.lock_dir),
    };

    Ok(Config {
        event_log: DatabaseConfig { path: event_log_path, pool_size },
        metadata: DatabaseConfig { path: metadata_path, pool_size },
        sync,
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, searches the standard locations. The format is
/// detected by file extension.
///
/// # Errors
/// Returns `MetaSyncError::Config` if no file is found or it does not
/// parse.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(MetaSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => search_config_paths().ok_or_else(|| {
            MetaSyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| MetaSyncError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| MetaSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| MetaSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(MetaSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Search the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn search_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.clone());
        roots.push(cwd.join(".."));
        roots.push(cwd.join("../.."));
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
            roots.push(exe_dir.join(".."));
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| MetaSyncError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional environment variable, using `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| MetaSyncError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_VARS: [&str; 10] = [
        "METASYNC_EVENT_LOG_PATH",
        "METASYNC_METADATA_PATH",
        "METASYNC_DB_POOL_SIZE",
        "METASYNC_SYNC_ENABLED",
        "METASYNC_SYNC_CRON",
        "METASYNC_SYNC_PAGE_SIZE",
        "METASYNC_SYNC_MAX_CONCURRENT",
        "METASYNC_SYNC_ENTRY_TIMEOUT",
        "METASYNC_SYNC_CYCLE_TIMEOUT",
        "METASYNC_LOCK_DIR",
    ];

    fn clear_env() {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
    }

    fn write_config(contents: &str, extension: &str) -> (NamedTempFile, PathBuf) {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        (temp_file, path)
    }

    #[test]
    fn env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("METASYNC_TEST_BOOL_ON", "On");
        std::env::set_var("METASYNC_TEST_BOOL_OFF", "0");
        std::env::remove_var("METASYNC_TEST_BOOL_MISSING");

        assert!(env_bool("METASYNC_TEST_BOOL_ON", false));
        assert!(!env_bool("METASYNC_TEST_BOOL_OFF", true));
        assert!(env_bool("METASYNC_TEST_BOOL_MISSING", true));

        std::env::remove_var("METASYNC_TEST_BOOL_ON");
        std::env::remove_var("METASYNC_TEST_BOOL_OFF");
    }

    #[test]
    fn load_from_env_with_required_vars_only() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("METASYNC_EVENT_LOG_PATH", "/tmp/events.db");
        std::env::set_var("METASYNC_METADATA_PATH", "/tmp/meta.db");

        let config = load_from_env().expect("required vars are set");

        assert_eq!(config.event_log.path, "/tmp/events.db");
        assert_eq!(config.metadata.path, "/tmp/meta.db");
        assert_eq!(config.metadata.pool_size, 4);
        assert_eq!(config.sync, SyncConfig::default());
        clear_env();
    }

    #[test]
    fn load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("METASYNC_EVENT_LOG_PATH", "/tmp/events.db");
        std::env::set_var("METASYNC_METADATA_PATH", "/tmp/meta.db");
        std::env::set_var("METASYNC_DB_POOL_SIZE", "8");
        std::env::set_var("METASYNC_SYNC_ENABLED", "false");
        std::env::set_var("METASYNC_SYNC_CRON", "0 */5 * * * *");
        std::env::set_var("METASYNC_SYNC_PAGE_SIZE", "50");
        std::env::set_var("METASYNC_SYNC_MAX_CONCURRENT", "2");
        std::env::set_var("METASYNC_SYNC_ENTRY_TIMEOUT", "10");
        std::env::set_var("METASYNC_SYNC_CYCLE_TIMEOUT", "120");
        std::env::set_var("METASYNC_LOCK_DIR", "/var/run/metasync");

        let config = load_from_env().expect("all vars are valid");

        assert_eq!(config.event_log.pool_size, 8);
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.cron_expression, "0 */5 * * * *");
        assert_eq!(config.sync.page_size, 50);
        assert_eq!(config.sync.max_concurrent_entries, 2);
        assert_eq!(config.sync.entry_timeout_secs, 10);
        assert_eq!(config.sync.cycle_timeout_secs, 120);
        assert_eq!(config.sync.lock_dir, "/var/run/metasync");
        clear_env();
    }

    #[test]
    fn load_from_env_missing_path() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("METASYNC_EVENT_LOG_PATH", "/tmp/events.db");

        let err = load_from_env().unwrap_err();

        assert!(matches!(err, MetaSyncError::Config(message) if message.contains("METASYNC_METADATA_PATH")));
        clear_env();
    }

    #[test]
    fn load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("METASYNC_EVENT_LOG_PATH", "/tmp/events.db");
        std::env::set_var("METASYNC_METADATA_PATH", "/tmp/meta.db");
        std::env::set_var("METASYNC_SYNC_PAGE_SIZE", "lots");

        let err = load_from_env().unwrap_err();

        assert!(matches!(err, MetaSyncError::Config(message) if message.contains("METASYNC_SYNC_PAGE_SIZE")));
        clear_env();
    }

    #[test]
    fn load_from_file_json() {
        let (_temp_file, path) = write_config(
            r#"{
                "event_log": { "path": "events.db" },
                "metadata": { "path": "meta.db", "pool_size": 2 },
                "sync": { "page_size": 25 }
            }"#,
            "json",
        );

        let config = load_from_file(Some(path.clone())).expect("valid JSON config");

        assert_eq!(config.event_log.path, "events.db");
        assert_eq!(config.metadata.pool_size, 2);
        assert_eq!(config.sync.page_size, 25);
        assert_eq!(config.sync.max_concurrent_entries, 4);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn load_from_file_toml() {
        let (_temp_file, path) = write_config(
            r#"
[event_log]
path = "events.db"

[metadata]
path = "meta.db"

[sync]
enabled = false
cron_expression = "0 30 * * * *"
"#,
            "toml",
        );

        let config = load_from_file(Some(path.clone())).expect("valid TOML config");

        assert!(!config.sync.enabled);
        assert_eq!(config.sync.cron_expression, "0 30 * * * *");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn load_from_file_not_found() {
        let err = load_from_file(Some(PathBuf::from("/nonexistent/config.json"))).unwrap_err();
        assert!(matches!(err, MetaSyncError::Config(_)));
    }

    #[test]
    fn parse_config_rejects_invalid_and_unsupported_input() {
        assert!(parse_config(r#"{ "event_log": "#, Path::new("config.json")).is_err());
        assert!(parse_config("event_log: {}", Path::new("config.yaml")).is_err());
    }
}
