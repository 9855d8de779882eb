//! Producer-side execution logger
//!
//! Buffers the lifecycle events of one workflow run and appends them to the
//! execution log in a single transaction on [`ExecutionLogger::flush`].

use std::sync::Arc;

use chrono::Utc;
use metasync_domain::constants::NO_LOOP;
use metasync_domain::{EntryStatus, LogEntry, LogEvent, LoopScope, Provider, Result};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::database::SqliteEventLog;

/// One event as reported by the workflow runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRecord {
    pub event: LogEvent,
    pub entry_type: String,
    pub external_id: Option<String>,
    pub function_name: Option<String>,
    pub function_type: Option<String>,
    pub provider: Option<Provider>,
    pub output: Option<String>,
    pub rtt_ms: i64,
    pub success: bool,
    pub memory_size_mb: Option<i32>,
    pub loop_counter: i32,
    pub max_loop_counter: i32,
    pub start_time: i64,
}

impl InvocationRecord {
    /// A record outside any parallel loop, with every optional field unset.
    pub fn new(event: LogEvent, entry_type: impl Into<String>, start_time: i64) -> Self {
        Self {
            event,
            entry_type: entry_type.into(),
            external_id: None,
            function_name: None,
            function_type: None,
            provider: None,
            output: None,
            rtt_ms: 0,
            success: true,
            memory_size_mb: None,
            loop_counter: NO_LOOP,
            max_loop_counter: NO_LOOP,
            start_time,
        }
    }
}

/// Buffered writer of execution log entries for one workflow run.
pub struct ExecutionLogger {
    log: Arc<SqliteEventLog>,
    workflow_id: i64,
    buffer: Mutex<Vec<LogEntry>>,
}

impl ExecutionLogger {
    /// Create a logger stamped with the current time in milliseconds as its
    /// workflow id.
    pub fn new(log: Arc<SqliteEventLog>) -> Self {
        Self::with_workflow_id(log, Utc::now().timestamp_millis())
    }

    pub fn with_workflow_id(log: Arc<SqliteEventLog>, workflow_id: i64) -> Self {
        Self { log, workflow_id, buffer: Mutex::new(Vec::new()) }
    }

    pub fn workflow_id(&self) -> i64 {
        self.workflow_id
    }

    /// Entries buffered and not yet flushed.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Buffer one event.
    ///
    /// Function events enter the log as pending; workflow events never take
    /// part in aggregation and are stored as skipped.
    pub fn record(&self, record: InvocationRecord) {
        let status = if record.event.is_function_event() {
            EntryStatus::Pending
        } else {
            EntryStatus::Skipped
        };

        let entry = LogEntry {
            id: 0,
            workflow_id: Some(self.workflow_id),
            event: Some(record.event),
            entry_type: record.entry_type,
            external_id: record.external_id,
            function_name: record.function_name,
            function_type: record.function_type,
            provider: record.provider,
            output: record.output,
            rtt_ms: Some(record.rtt_ms),
            success: Some(record.success),
            memory_size_mb: record.memory_size_mb,
            loop_counter: Some(record.loop_counter),
            max_loop_counter: Some(record.max_loop_counter),
            precomputed_cost: None,
            start_time: Some(record.start_time),
            end_time: Some(record.start_time.saturating_add(record.rtt_ms)),
            status,
        };

        debug!(workflow_id = self.workflow_id, event = %record.event, "execution_logger.recorded");
        self.buffer.lock().push(entry);
    }

    /// Append the buffer to the log in one transaction and return the
    /// number of entries written.
    ///
    /// # Errors
    /// On failure nothing is written and the entries stay buffered.
    #[instrument(skip(self), fields(workflow_id = self.workflow_id))]
    pub async fn flush(&self) -> Result<usize> {
        let entries = std::mem::take(&mut *self.buffer.lock());
        if entries.is_empty() {
            return Ok(0);
        }

        match self.log.append_batch(&entries).await {
            Ok(ids) => {
                debug!(count = ids.len(), "execution_logger.flushed");
                Ok(ids.len())
            }
            Err(err) => {
                warn!(error = %err, count = entries.len(), "execution_logger.flush_failed");
                let mut buffer = self.buffer.lock();
                let recorded_since = std::mem::replace(&mut *buffer, entries);
                buffer.extend(recorded_since);
                Err(err)
            }
        }
    }

    /// Latest end time of this workflow within `scope`, across buffered and
    /// stored entries.
    pub async fn last_end_time(&self, scope: LoopScope) -> Result<Option<i64>> {
        let buffered = self
            .buffer
            .lock()
            .iter()
            .filter(|entry| scope.matches(entry.loop_counter))
            .filter_map(|entry| entry.end_time)
            .max();
        let stored = self.log.last_end_time(self.workflow_id, scope).await?;

        Ok(buffered.max(stored))
    }
}
