//! Cycle runner
//!
//! Wires a [`SyncCycle`] to the SQLite stores and runs it under the
//! cross-process [`InstanceLock`], recording every outcome in
//! [`CycleMetrics`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use metasync_core::{SyncCycle, SyncCycleConfig, SyncError};
use metasync_domain::{MetaSyncError, Result as DomainResult, SyncConfig, SyncStats};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::database::{DbManager, SqliteAggregateStore, SqliteEventLog, SqlitePricingCatalog};
use crate::instance_lock::InstanceLock;
use crate::observability::log_metric;
use crate::observability::metrics::CycleMetrics;

/// Runs sync cycles one at a time across processes.
pub struct CycleRunner {
    cycle: SyncCycle,
    lock_dir: PathBuf,
    metrics: Arc<CycleMetrics>,
}

impl CycleRunner {
    pub fn new(cycle: SyncCycle, lock_dir: impl Into<PathBuf>, metrics: Arc<CycleMetrics>) -> Self {
        Self { cycle, lock_dir: lock_dir.into(), metrics }
    }

    /// Build a runner over the execution log in `event_log` and the tier
    /// aggregates and pricing in `metadata`. Both may be the same database.
    ///
    /// # Errors
    /// Fails when the identity of the execution log cannot be read or
    /// created.
    pub async fn from_managers(
        event_log: Arc<DbManager>,
        metadata: Arc<DbManager>,
        sync: &SyncConfig,
        metrics: Arc<CycleMetrics>,
    ) -> DomainResult<Self> {
        let events = SqliteEventLog::new(event_log);
        let log_id = events.identity().await?;
        let cycle = SyncCycle::new(
            Arc::new(events),
            Arc::new(SqliteAggregateStore::new(Arc::clone(&metadata), log_id)),
            Arc::new(SqlitePricingCatalog::new(metadata)),
            SyncCycleConfig::from(sync),
        );
        Ok(Self::new(cycle, &sync.lock_dir, metrics))
    }

    pub fn metrics(&self) -> &Arc<CycleMetrics> {
        &self.metrics
    }

    /// Run one cycle to completion.
    pub async fn run_once(&self) -> Result<SyncStats, SyncError> {
        self.run_once_until_cancelled(&CancellationToken::new()).await
    }

    /// Run one cycle, abandoning it once `cancel` fires.
    ///
    /// # Errors
    /// Returns [`SyncError::CycleInProgress`] without running when another
    /// cycle holds the lock, in this process or another one.
    #[instrument(skip(self, cancel))]
    pub async fn run_once_until_cancelled(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SyncStats, SyncError> {
        let _lock = match InstanceLock::acquire(&self.lock_dir) {
            Ok(lock) => lock,
            Err(MetaSyncError::Conflict(message)) => {
                debug!(reason = %message, "cycle_runner.lock_contended");
                log_metric(self.metrics.record_lock_contention(), "cycle.lock_contention");
                return Err(SyncError::CycleInProgress);
            }
            Err(err) => return Err(SyncError::from(err)),
        };

        let started = Instant::now();
        let result = self.cycle.run_until_cancelled(cancel).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(stats) => log_metric(self.metrics.record_completed(stats, elapsed), "cycle.completed"),
            Err(SyncError::Timeout(_)) => {
                log_metric(self.metrics.record_timeout(elapsed), "cycle.timeout");
            }
            Err(SyncError::CycleInProgress) => {
                log_metric(self.metrics.record_lock_contention(), "cycle.lock_contention");
            }
            Err(err) => {
                warn!(error = %err, elapsed_ms = elapsed.as_millis() as u64, "cycle_runner.cycle_failed");
                log_metric(self.metrics.record_failed(elapsed), "cycle.failed");
            }
        }
        result
    }
}
