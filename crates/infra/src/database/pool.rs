//! SQLite connection pool helpers
//!
//! Builds the r2d2 pool every repository draws from and applies the
//! per-connection pragmas.

use std::path::Path;
use std::time::Duration;

use metasync_domain::{DatabaseConfig, Result as DomainResult};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::warn;

use crate::errors::InfraError;

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_size: u32,

    /// How long a checkout waits before the store counts as unreachable
    pub connection_timeout: Duration,

    /// Busy timeout for SQLite operations
    pub busy_timeout: Duration,

    pub enable_wal: bool,
    pub enable_foreign_keys: bool,
}

impl From<&DatabaseConfig> for PoolSettings {
    fn from(config: &DatabaseConfig) -> Self {
        Self { max_size: config.pool_size, ..Self::default() }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 4,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_millis(5000),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

/// Create a pool for the database file at `path`.
///
/// # Errors
/// Returns `Unavailable` when no connection can be opened.
pub fn create_sqlite_pool(path: &Path, settings: &PoolSettings) -> DomainResult<SqlitePool> {
    let pragmas = settings.clone();
    let manager = SqliteConnectionManager::file(path)
        .with_init(move |conn| apply_connection_pragmas(conn, &pragmas));

    Pool::builder()
        .max_size(settings.max_size.max(1))
        .connection_timeout(settings.connection_timeout)
        .build(manager)
        .map_err(|err| {
            warn!(db_path = %path.display(), error = %err, "sqlite pool creation failed");
            InfraError::from(err).into()
        })
}

/// Apply connection-level pragmas.
pub fn apply_connection_pragmas(conn: &Connection, settings: &PoolSettings) -> rusqlite::Result<()> {
    let mut pragma_sql = String::new();

    if settings.enable_wal {
        pragma_sql.push_str("PRAGMA journal_mode=WAL;\n");
        pragma_sql.push_str("PRAGMA wal_autocheckpoint=1000;\n");
    }
    pragma_sql.push_str("PRAGMA synchronous=NORMAL;\n");
    if settings.enable_foreign_keys {
        pragma_sql.push_str("PRAGMA foreign_keys=ON;\n");
    }

    conn.execute_batch(&pragma_sql)?;
    conn.busy_timeout(settings.busy_timeout)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn pooled_connections_carry_pragmas() {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_sqlite_pool(&temp_dir.path().join("test.db"), &PoolSettings::default())
            .expect("pool should be created");

        let conn = pool.get().expect("connection should be acquired");
        let journal_mode: String =
            conn.pragma_query_value(None, "journal_mode", |row| row.get(0)).unwrap();
        let foreign_keys: i64 =
            conn.pragma_query_value(None, "foreign_keys", |row| row.get(0)).unwrap();

        assert_eq!(journal_mode.to_lowercase(), "wal");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn pool_size_comes_from_database_config() {
        let config = DatabaseConfig { path: "x.db".into(), pool_size: 9 };
        assert_eq!(PoolSettings::from(&config).max_size, 9);
    }
}
