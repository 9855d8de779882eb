//! Database connection manager backed by the SQLite pool.

use std::path::{Path, PathBuf};

use metasync_domain::{DatabaseConfig, MetaSyncError, Result};
use rusqlite::params;
use tokio::task;
use tracing::info;

use super::pool::{create_sqlite_pool, PoolSettings, SqliteConnection, SqlitePool};
use crate::errors::InfraError;

pub(crate) const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Database manager that owns one connection pool.
pub struct DbManager {
    pool: SqlitePool,
    path: PathBuf,
}

impl DbManager {
    /// Create a new manager with the given pool size.
    pub fn new<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self> {
        let settings = PoolSettings { max_size: pool_size, ..PoolSettings::default() };
        Self::with_settings(db_path, &settings)
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_settings(&config.path, &PoolSettings::from(config))
    }

    pub fn with_settings<P: AsRef<Path>>(db_path: P, settings: &PoolSettings) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let pool = create_sqlite_pool(&path, settings)?;

        info!(
            db_path = %path.display(),
            max_connections = pool.max_size(),
            "sqlite pool initialised"
        );

        Ok(Self { pool, path })
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<SqliteConnection> {
        self.pool.get().map_err(|err| InfraError::from(err).into())
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        create_schema(&conn)
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the database is reachable and answering queries.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(map_sql_error)?;
        Ok(())
    }
}

fn create_schema(conn: &SqliteConnection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, CAST(strftime('%s','now') AS INTEGER))",
        params![SCHEMA_VERSION],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

pub(crate) fn map_sql_error(err: rusqlite::Error) -> MetaSyncError {
    MetaSyncError::from(InfraError::from(err))
}

pub(crate) fn map_join_error(err: task::JoinError) -> MetaSyncError {
    if err.is_cancelled() {
        MetaSyncError::Internal("database task cancelled".into())
    } else {
        MetaSyncError::Internal(format!("database task panic: {err}"))
    }
}

pub(crate) fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
