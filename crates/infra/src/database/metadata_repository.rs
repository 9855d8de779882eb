//! SQLite-backed tier aggregate store.
//!
//! Holds the `function_type`, `function_implementation` and
//! `function_deployment` rows together with the `applied_entry` ledger.
//! Ledger rows are keyed by the identity of the execution log they came
//! from, so a recreated log whose ids restart is never mistaken for one
//! already applied. All three tier rows of an update are written in one transaction, each
//! guarded by its expected invocation count.

use std::sync::Arc;

use async_trait::async_trait;
use metasync_core::AggregateStore;
use metasync_domain::{
    DeploymentRecord, ImplementationRecord, LineageHint, MetaSyncError, Provider,
    Result as DomainResult, TierLineage, TierStats, TypeRecord,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tokio::task;
use tracing::{debug, info, instrument};

use super::manager::{map_join_error, map_sql_error, DbManager};

/// Aggregate store over the metadata database.
pub struct SqliteAggregateStore {
    db: Arc<DbManager>,
    log_id: Arc<str>,
}

impl SqliteAggregateStore {
    /// Store recording applied entries of the execution log identified by
    /// `log_id` (see [`super::SqliteEventLog::identity`]).
    pub fn new(db: Arc<DbManager>, log_id: impl Into<Arc<str>>) -> Self {
        Self { db, log_id: log_id.into() }
    }

    /// Register a deployment under `external_id`.
    ///
    /// With a `hint` the implementation and type rows are created as needed
    /// and linked right away; without one the deployment stays unlinked
    /// until its first update. Registering an existing external id is a
    /// `Conflict`.
    #[instrument(skip(self, hint))]
    pub async fn register_deployment(
        &self,
        external_id: &str,
        memory_size_mb: Option<i32>,
        hint: Option<LineageHint>,
    ) -> DomainResult<DeploymentRecord> {
        let db = Arc::clone(&self.db);
        let external_id = external_id.to_string();

        let deployment = task::spawn_blocking(move || -> DomainResult<DeploymentRecord> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;

            let implementation_id = match &hint {
                Some(hint) => Some(ensure_implementation(&tx, hint)?),
                None => None,
            };
            tx.execute(DEPLOYMENT_INSERT_SQL, params![external_id, implementation_id, memory_size_mb])
                .map_err(map_sql_error)?;
            let deployment = select_deployment(&tx, tx.last_insert_rowid())?;

            tx.commit().map_err(map_sql_error)?;
            Ok(deployment)
        })
        .await
        .map_err(map_join_error)??;

        info!(deployment_id = deployment.id, "metadata.deployment_registered");
        Ok(deployment)
    }
}

#[async_trait]
impl AggregateStore for SqliteAggregateStore {
    async fn find_deployment(&self, external_id: &str) -> DomainResult<Option<DeploymentRecord>> {
        let db = Arc::clone(&self.db);
        let external_id = external_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<DeploymentRecord>> {
            let conn = db.get_connection()?;
            conn.query_row(DEPLOYMENT_BY_EXTERNAL_ID_SQL, params![external_id], map_deployment_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn load_lineage(
        &self,
        deployment_id: i64,
        hint: Option<&LineageHint>,
    ) -> DomainResult<TierLineage> {
        let db = Arc::clone(&self.db);
        let hint = hint.cloned();

        task::spawn_blocking(move || -> DomainResult<TierLineage> {
            let mut conn = db.get_connection()?;
            let deployment = select_deployment(&conn, deployment_id)?;

            let deployment = match (deployment.implementation_id, hint) {
                (Some(_), _) => deployment,
                (None, Some(hint)) => {
                    let tx = conn
                        .transaction_with_behavior(TransactionBehavior::Immediate)
                        .map_err(map_sql_error)?;
                    let implementation_id = ensure_implementation(&tx, &hint)?;
                    tx.execute(DEPLOYMENT_LINK_SQL, params![implementation_id, deployment_id])
                        .map_err(map_sql_error)?;
                    // A concurrent link may have won; read back what is stored.
                    let linked = select_deployment(&tx, deployment_id)?;
                    tx.commit().map_err(map_sql_error)?;
                    debug!(deployment_id, implementation_id, "metadata.deployment_linked");
                    linked
                }
                (None, None) => {
                    return Err(MetaSyncError::InvalidInput(format!(
                        "deployment {deployment_id} has no implementation"
                    )))
                }
            };

            let implementation_id = deployment.implementation_id.ok_or_else(|| {
                MetaSyncError::Internal(format!("deployment {deployment_id} left unlinked"))
            })?;
            let implementation = select_implementation(&conn, implementation_id)?;
            let function_type = select_type(&conn, implementation.type_id)?;

            Ok(TierLineage { deployment, implementation, function_type })
        })
        .await
        .map_err(map_join_error)?
    }

    async fn is_applied(&self, entry_id: i64) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let log_id = Arc::clone(&self.log_id);

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            conn.query_row(APPLIED_EXISTS_SQL, params![&*log_id, entry_id], |row| {
                row.get::<_, bool>(0)
            })
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, updated), fields(deployment_id = updated.deployment.id))]
    async fn commit_lineage(&self, entry_id: i64, updated: &TierLineage) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let log_id = Arc::clone(&self.log_id);
        let updated = updated.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;

            let TierLineage { deployment, implementation, function_type } = &updated;
            let ds = deployment.stats;
            let written = tx
                .execute(
                    DEPLOYMENT_UPDATE_SQL,
                    params![
                        deployment.implementation_id,
                        ds.avg_rtt,
                        deployment.avg_runtime,
                        ds.avg_cost,
                        ds.success_rate,
                        deployment.avg_loop_counter,
                        ds.invocations,
                        deployment.id,
                        ds.invocations - 1,
                    ],
                )
                .map_err(map_sql_error)?;
            expect_one_row(written, "function_deployment", deployment.id)?;

            let is = implementation.stats;
            let written = tx
                .execute(
                    IMPLEMENTATION_UPDATE_SQL,
                    params![
                        is.avg_rtt,
                        is.avg_cost,
                        is.success_rate,
                        is.invocations,
                        implementation.id,
                        is.invocations - 1
                    ],
                )
                .map_err(map_sql_error)?;
            expect_one_row(written, "function_implementation", implementation.id)?;

            let ts = function_type.stats;
            let written = tx
                .execute(
                    TYPE_UPDATE_SQL,
                    params![
                        ts.avg_rtt,
                        ts.avg_cost,
                        ts.success_rate,
                        ts.invocations,
                        function_type.id,
                        ts.invocations - 1
                    ],
                )
                .map_err(map_sql_error)?;
            expect_one_row(written, "function_type", function_type.id)?;

            tx.execute(APPLIED_INSERT_SQL, params![&*log_id, entry_id]).map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

/// Find or create the type and implementation rows named by `hint`.
fn ensure_implementation(conn: &Connection, hint: &LineageHint) -> DomainResult<i64> {
    conn.execute(TYPE_INSERT_SQL, params![hint.function_name, hint.function_type])
        .map_err(map_sql_error)?;
    let type_id: i64 = conn
        .query_row(TYPE_ID_SQL, params![hint.function_name, hint.function_type], |row| row.get(0))
        .map_err(map_sql_error)?;

    let name = hint.implementation_name();
    let provider = hint.provider.to_string();
    conn.execute(IMPLEMENTATION_INSERT_SQL, params![name, type_id, provider])
        .map_err(map_sql_error)?;
    conn.query_row(IMPLEMENTATION_ID_SQL, params![provider, name, type_id], |row| row.get(0))
        .map_err(map_sql_error)
}

fn expect_one_row(written: usize, table: &str, id: i64) -> DomainResult<()> {
    if written == 1 {
        Ok(())
    } else {
        Err(MetaSyncError::Conflict(format!("{table} row {id} changed since it was read")))
    }
}

fn select_deployment(conn: &Connection, id: i64) -> DomainResult<DeploymentRecord> {
    conn.query_row(DEPLOYMENT_BY_ID_SQL, params![id], map_deployment_row)
        .optional()
        .map_err(map_sql_error)?
        .ok_or_else(|| MetaSyncError::NotFound(format!("deployment {id}")))
}

fn select_implementation(conn: &Connection, id: i64) -> DomainResult<ImplementationRecord> {
    conn.query_row(IMPLEMENTATION_BY_ID_SQL, params![id], map_implementation_row)
        .optional()
        .map_err(map_sql_error)?
        .ok_or_else(|| MetaSyncError::NotFound(format!("implementation {id}")))
}

fn select_type(conn: &Connection, id: i64) -> DomainResult<TypeRecord> {
    conn.query_row(TYPE_BY_ID_SQL, params![id], map_type_row)
        .optional()
        .map_err(map_sql_error)?
        .ok_or_else(|| MetaSyncError::NotFound(format!("type {id}")))
}

const DEPLOYMENT_BY_ID_SQL: &str = "SELECT
        id, external_id, implementation_id, memory_size_mb, avg_rtt, avg_runtime, avg_cost,
        success_rate, avg_loop_counter, invocations
    FROM function_deployment
    WHERE id = ?1";

const DEPLOYMENT_BY_EXTERNAL_ID_SQL: &str = "SELECT
        id, external_id, implementation_id, memory_size_mb, avg_rtt, avg_runtime, avg_cost,
        success_rate, avg_loop_counter, invocations
    FROM function_deployment
    WHERE external_id = ?1";

const DEPLOYMENT_INSERT_SQL: &str = "INSERT INTO function_deployment
        (external_id, implementation_id, memory_size_mb)
    VALUES (?1, ?2, ?3)";

const DEPLOYMENT_LINK_SQL: &str = "UPDATE function_deployment
    SET implementation_id = ?1
    WHERE id = ?2 AND implementation_id IS NULL";

const DEPLOYMENT_UPDATE_SQL: &str = "UPDATE function_deployment
    SET implementation_id = ?1, avg_rtt = ?2, avg_runtime = ?3, avg_cost = ?4,
        success_rate = ?5, avg_loop_counter = ?6, invocations = ?7
    WHERE id = ?8 AND invocations = ?9";

const IMPLEMENTATION_BY_ID_SQL: &str = "SELECT
        id, name, type_id, provider, avg_rtt, avg_cost, success_rate, invocations
    FROM function_implementation
    WHERE id = ?1";

const IMPLEMENTATION_INSERT_SQL: &str = "INSERT OR IGNORE INTO function_implementation
        (name, type_id, provider)
    VALUES (?1, ?2, ?3)";

const IMPLEMENTATION_ID_SQL: &str = "SELECT id FROM function_implementation
    WHERE provider = ?1 AND name = ?2 AND type_id = ?3";

const IMPLEMENTATION_UPDATE_SQL: &str = "UPDATE function_implementation
    SET avg_rtt = ?1, avg_cost = ?2, success_rate = ?3, invocations = ?4
    WHERE id = ?5 AND invocations = ?6";

const TYPE_BY_ID_SQL: &str = "SELECT
        id, name, type, avg_rtt, avg_cost, success_rate, invocations
    FROM function_type
    WHERE id = ?1";

const TYPE_INSERT_SQL: &str = "INSERT OR IGNORE INTO function_type (name, type) VALUES (?1, ?2)";

const TYPE_ID_SQL: &str = "SELECT id FROM function_type WHERE name = ?1 AND type = ?2";

const TYPE_UPDATE_SQL: &str = "UPDATE function_type
    SET avg_rtt = ?1, avg_cost = ?2, success_rate = ?3, invocations = ?4
    WHERE id = ?5 AND invocations = ?6";

const APPLIED_EXISTS_SQL: &str =
    "SELECT EXISTS (SELECT 1 FROM applied_entry WHERE log_id = ?1 AND entry_id = ?2)";

const APPLIED_INSERT_SQL: &str = "INSERT INTO applied_entry (log_id, entry_id, applied_at)
    VALUES (?1, ?2, CAST(strftime('%s','now') AS INTEGER))";

fn map_deployment_row(row: &Row<'_>) -> rusqlite::Result<DeploymentRecord> {
    Ok(DeploymentRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        implementation_id: row.get(2)?,
        memory_size_mb: row.get(3)?,
        stats: TierStats {
            avg_rtt: row.get(4)?,
            avg_cost: row.get(6)?,
            success_rate: row.get(7)?,
            invocations: row.get(9)?,
        },
        avg_runtime: row.get(5)?,
        avg_loop_counter: row.get(8)?,
    })
}

fn map_implementation_row(row: &Row<'_>) -> rusqlite::Result<ImplementationRecord> {
    let provider: String = row.get(3)?;
    Ok(ImplementationRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        type_id: row.get(2)?,
        provider: provider.parse().unwrap_or(Provider::Unknown),
        stats: TierStats {
            avg_rtt: row.get(4)?,
            avg_cost: row.get(5)?,
            success_rate: row.get(6)?,
            invocations: row.get(7)?,
        },
    })
}

fn map_type_row(row: &Row<'_>) -> rusqlite::Result<TypeRecord> {
    Ok(TypeRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        type_name: row.get(2)?,
        stats: TierStats {
            avg_rtt: row.get(3)?,
            avg_cost: row.get(4)?,
            success_rate: row.get(5)?,
            invocations: row.get(6)?,
        },
    })
}
