//! SQLite-backed execution log.
//!
//! Implements the [`EventSource`] port the sync cycle reads from, plus the
//! append and reporting operations used by the producer side and the CLI.

use std::sync::Arc;

use async_trait::async_trait;
use metasync_core::EventSource;
use metasync_domain::constants::EXEC_ENTRY_TYPE;
use metasync_domain::{
    EntryStatus, EventLogCounts, LogEntry, LogEvent, LoopScope, MetaSyncError, Provider,
    Result as DomainResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::task;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::manager::{map_join_error, map_sql_error, usize_to_i64, DbManager};

/// Execution log stored in the `execution_log` table.
pub struct SqliteEventLog {
    db: Arc<DbManager>,
}

impl SqliteEventLog {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Append one entry and return its id. The entry's own `id` is ignored.
    pub async fn append(&self, entry: &LogEntry) -> DomainResult<i64> {
        let ids = self.append_batch(std::slice::from_ref(entry)).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| MetaSyncError::Internal("append returned no id".into()))
    }

    /// Append entries in one transaction, returning their ids in order.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn append_batch(&self, entries: &[LogEntry]) -> DomainResult<Vec<i64>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let db = Arc::clone(&self.db);
        let entries = entries.to_vec();

        task::spawn_blocking(move || -> DomainResult<Vec<i64>> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            let mut ids = Vec::with_capacity(entries.len());
            {
                let mut stmt = tx.prepare(LOG_INSERT_SQL).map_err(map_sql_error)?;
                for entry in &entries {
                    stmt.execute(params![
                        entry.workflow_id,
                        entry.event.map(|event| event.to_string()),
                        entry.entry_type,
                        entry.external_id,
                        entry.function_name,
                        entry.function_type,
                        entry.provider.map(|provider| provider.to_string()),
                        entry.output,
                        entry.rtt_ms,
                        entry.success,
                        entry.memory_size_mb,
                        entry.loop_counter,
                        entry.max_loop_counter,
                        entry.precomputed_cost,
                        entry.start_time,
                        entry.end_time,
                        entry.status.to_string(),
                    ])
                    .map_err(map_sql_error)?;
                    ids.push(tx.last_insert_rowid());
                }
            }
            tx.commit().map_err(map_sql_error)?;
            Ok(ids)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Stable identity of this log, created on first use.
    ///
    /// Entry ids are only unique within one log file; the identity tells a
    /// recreated log apart from the one it replaced.
    pub async fn identity(&self) -> DomainResult<String> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<String> {
            let conn = db.get_connection()?;
            let created = conn
                .execute(LOG_IDENTITY_INSERT_SQL, params![Uuid::new_v4().to_string()])
                .map_err(map_sql_error)?;
            let log_id: String = conn
                .query_row(LOG_IDENTITY_SELECT_SQL, [], |row| row.get(0))
                .map_err(map_sql_error)?;
            if created > 0 {
                info!(log_id = %log_id, "event_log.identity_created");
            }
            Ok(log_id)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Fetch a single entry by id.
    pub async fn get(&self, entry_id: i64) -> DomainResult<Option<LogEntry>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Option<LogEntry>> {
            let conn = db.get_connection()?;
            conn.query_row(LOG_SELECT_BY_ID_SQL, params![entry_id], map_log_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Number of entries per status.
    pub async fn counts(&self) -> DomainResult<EventLogCounts> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<EventLogCounts> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(LOG_COUNTS_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(map_sql_error)?;

            let mut counts = EventLogCounts::default();
            for row in rows {
                let (status, count) = row.map_err(map_sql_error)?;
                match parse_status(&status) {
                    Some(EntryStatus::Pending) => counts.pending += count,
                    Some(EntryStatus::Done) => counts.done += count,
                    Some(EntryStatus::Skipped) => counts.skipped += count,
                    None => {}
                }
            }
            Ok(counts)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Latest `end_time` recorded for a workflow within `scope`.
    pub async fn last_end_time(
        &self,
        workflow_id: i64,
        scope: LoopScope,
    ) -> DomainResult<Option<i64>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Option<i64>> {
            let conn = db.get_connection()?;
            query_last_end_time(&conn, workflow_id, scope)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl EventSource for SqliteEventLog {
    async fn select_pending(&self, after: Option<i64>, limit: usize) -> DomainResult<Vec<LogEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<LogEntry>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(LOG_SELECT_PENDING_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(
                    params![
                        EXEC_ENTRY_TYPE,
                        after.unwrap_or(i64::MIN),
                        usize_to_i64(limit)
                    ],
                    map_log_row,
                )
                .map_err(map_sql_error)?;
            let entries = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?;
            debug!(count = entries.len(), after = ?after, "event_log.page");
            Ok(entries)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_status(&self, entry_id: i64, status: EntryStatus) -> DomainResult<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(LOG_MARK_SQL, params![status.to_string(), entry_id])
                .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(MetaSyncError::NotFound(format!("log entry {entry_id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

fn query_last_end_time(
    conn: &Connection,
    workflow_id: i64,
    scope: LoopScope,
) -> DomainResult<Option<i64>> {
    let sql = match scope {
        LoopScope::Any => LOG_LAST_END_SQL,
        LoopScope::OutsideLoop => LOG_LAST_END_OUTSIDE_LOOP_SQL,
        LoopScope::InsideLoop => LOG_LAST_END_INSIDE_LOOP_SQL,
    };
    conn.query_row(sql, params![workflow_id], |row| row.get::<_, Option<i64>>(0))
        .map_err(map_sql_error)
}

const LOG_INSERT_SQL: &str = "INSERT INTO execution_log (
        workflow_id, event, entry_type, external_id, function_name, function_type, provider,
        output, rtt_ms, success, memory_size_mb, loop_counter, max_loop_counter,
        precomputed_cost, start_time, end_time, status
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)";

const LOG_SELECT_PENDING_SQL: &str = "SELECT
        id, workflow_id, event, entry_type, external_id, function_name, function_type, provider,
        output, rtt_ms, success, memory_size_mb, loop_counter, max_loop_counter,
        precomputed_cost, start_time, end_time, status
    FROM execution_log
    WHERE status = 'pending' AND entry_type = ?1 AND external_id IS NOT NULL AND id > ?2
    ORDER BY id ASC
    LIMIT ?3";

const LOG_SELECT_BY_ID_SQL: &str = "SELECT
        id, workflow_id, event, entry_type, external_id, function_name, function_type, provider,
        output, rtt_ms, success, memory_size_mb, loop_counter, max_loop_counter,
        precomputed_cost, start_time, end_time, status
    FROM execution_log
    WHERE id = ?1";

const LOG_IDENTITY_INSERT_SQL: &str =
    "INSERT OR IGNORE INTO event_log_identity (id, log_id) VALUES (1, ?1)";

const LOG_IDENTITY_SELECT_SQL: &str = "SELECT log_id FROM event_log_identity WHERE id = 1";

const LOG_MARK_SQL: &str = "UPDATE execution_log SET status = ?1 WHERE id = ?2";

const LOG_COUNTS_SQL: &str = "SELECT status, COUNT(*) FROM execution_log GROUP BY status";

const LOG_LAST_END_SQL: &str =
    "SELECT MAX(end_time) FROM execution_log WHERE workflow_id = ?1";

const LOG_LAST_END_OUTSIDE_LOOP_SQL: &str = "SELECT MAX(end_time) FROM execution_log
    WHERE workflow_id = ?1 AND (loop_counter IS NULL OR loop_counter = -1)";

const LOG_LAST_END_INSIDE_LOOP_SQL: &str = "SELECT MAX(end_time) FROM execution_log
    WHERE workflow_id = ?1 AND loop_counter IS NOT NULL AND loop_counter <> -1";

fn map_log_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    let id: i64 = row.get(0)?;
    let event: Option<String> = row.get(2)?;
    let provider: Option<String> = row.get(7)?;
    let status: String = row.get(17)?;

    Ok(LogEntry {
        id,
        workflow_id: row.get(1)?,
        event: event.as_deref().and_then(|raw| parse_event(id, raw)),
        entry_type: row.get(3)?,
        external_id: row.get(4)?,
        function_name: row.get(5)?,
        function_type: row.get(6)?,
        provider: provider.as_deref().map(|raw| raw.parse().unwrap_or(Provider::Unknown)),
        output: row.get(8)?,
        rtt_ms: row.get(9)?,
        success: row.get(10)?,
        memory_size_mb: row.get(11)?,
        loop_counter: row.get(12)?,
        max_loop_counter: row.get(13)?,
        precomputed_cost: row.get(14)?,
        start_time: row.get(15)?,
        end_time: row.get(16)?,
        status: parse_status(&status).unwrap_or_else(|| {
            warn!(entry_id = id, raw_status = %status, "invalid log status, treating as pending");
            EntryStatus::Pending
        }),
    })
}

fn parse_event(entry_id: i64, raw: &str) -> Option<LogEvent> {
    match raw.parse::<LogEvent>() {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(entry_id, raw_event = %raw, error = %err, "unrecognised log event");
            None
        }
    }
}

fn parse_status(raw: &str) -> Option<EntryStatus> {
    raw.parse::<EntryStatus>().ok()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn setup_log() -> (SqliteEventLog, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("events.db"), 4).expect("manager created");
        manager.run_migrations().expect("migrations applied");
        (SqliteEventLog::new(Arc::new(manager)), temp_dir)
    }

    fn exec(external_id: &str) -> LogEntry {
        let mut entry = LogEntry::new_exec(0, external_id);
        entry.rtt_ms = Some(100);
        entry.success = Some(true);
        entry
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn identity_is_stable_per_log_file() {
        let (log, temp_dir) = setup_log().await;

        let first = log.identity().await.unwrap();
        assert_eq!(log.identity().await.unwrap(), first);

        let manager = DbManager::new(temp_dir.path().join("events-recreated.db"), 1).unwrap();
        manager.run_migrations().unwrap();
        let recreated = SqliteEventLog::new(Arc::new(manager));

        assert_ne!(recreated.identity().await.unwrap(), first);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_selection_filters_and_pages_by_id() {
        let (log, _temp_dir) = setup_log().await;
        let mut not_exec = exec("arn:b");
        not_exec.entry_type = "OTHER".into();
        let mut no_external_id = exec("arn:c");
        no_external_id.external_id = None;
        let mut done = exec("arn:d");
        done.status = EntryStatus::Done;

        let ids = log
            .append_batch(&[exec("arn:a"), not_exec, no_external_id, done, exec("arn:e"), exec("arn:f")])
            .await
            .unwrap();

        let first = log.select_pending(None, 2).await.unwrap();
        assert_eq!(first.iter().map(|e| e.id).collect::<Vec<_>>(), vec![ids[0], ids[4]]);

        let second = log.select_pending(Some(ids[4]), 2).await.unwrap();
        assert_eq!(second.iter().map(|e| e.id).collect::<Vec<_>>(), vec![ids[5]]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn entries_round_trip_through_the_table() {
        let (log, _temp_dir) = setup_log().await;
        let mut entry = exec("arn:aws:lambda:eu-west-1:1:function:thumb");
        entry.workflow_id = Some(1_700_000_000_000);
        entry.provider = Some(Provider::Aws);
        entry.output = Some(r#"{"runtime": 80}"#.into());
        entry.max_loop_counter = Some(-1);
        entry.precomputed_cost = Some(-1.0);
        entry.start_time = Some(10);
        entry.end_time = Some(110);

        let id = log.append(&entry).await.unwrap();
        let stored = log.get(id).await.unwrap().expect("entry stored");

        assert_eq!(stored, LogEntry { id, ..entry });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_status_is_idempotent_and_rejects_unknown_ids() {
        let (log, _temp_dir) = setup_log().await;
        let id = log.append(&exec("arn:a")).await.unwrap();

        log.mark_status(id, EntryStatus::Done).await.unwrap();
        log.mark_status(id, EntryStatus::Done).await.unwrap();

        assert!(log.select_pending(None, 10).await.unwrap().is_empty());
        assert_eq!(
            log.counts().await.unwrap(),
            EventLogCounts { pending: 0, done: 1, skipped: 0 }
        );
        assert!(matches!(
            log.mark_status(id + 100, EntryStatus::Skipped).await,
            Err(MetaSyncError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn last_end_time_respects_loop_scope() {
        let (log, _temp_dir) = setup_log().await;
        let workflow = Some(42);
        let mut outside = exec("arn:a");
        outside.workflow_id = workflow;
        outside.loop_counter = Some(-1);
        outside.end_time = Some(500);
        let mut inside = exec("arn:b");
        inside.workflow_id = workflow;
        inside.loop_counter = Some(2);
        inside.end_time = Some(900);
        log.append_batch(&[outside, inside]).await.unwrap();

        assert_eq!(log.last_end_time(42, LoopScope::Any).await.unwrap(), Some(900));
        assert_eq!(log.last_end_time(42, LoopScope::OutsideLoop).await.unwrap(), Some(500));
        assert_eq!(log.last_end_time(42, LoopScope::InsideLoop).await.unwrap(), Some(900));
        assert_eq!(log.last_end_time(7, LoopScope::Any).await.unwrap(), None);
    }
}
