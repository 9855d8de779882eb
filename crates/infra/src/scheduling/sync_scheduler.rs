//! Periodic sync trigger
//!
//! A cron-based scheduler that runs one sync cycle per firing. Join handles
//! are tracked, cancellation is explicit, and every asynchronous lifecycle
//! step is wrapped in a timeout. A firing that finds a cycle still running
//! is skipped.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use metasync_infra::scheduling::{SchedulerResult, SyncScheduler, SyncSchedulerConfig};
//! use metasync_infra::sync::CycleRunner;
//!
//! # async fn example(runner: Arc<CycleRunner>) -> SchedulerResult<()> {
//! let mut scheduler = SyncScheduler::with_config(
//!     SyncSchedulerConfig {
//!         cron_expression: "0 */5 * * * *".into(), // every 5 minutes
//!         ..Default::default()
//!     },
//!     runner,
//! )
//! .await?;
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metasync_core::SyncError;
use metasync_domain::constants::DEFAULT_SYNC_CRON;
use metasync_domain::{SyncConfig, SyncStats};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::scheduling::error::{SchedulerError, SchedulerResult};
use crate::sync::CycleRunner;

/// A sync cycle the scheduler can trigger.
#[async_trait]
pub trait CycleJob: Send + Sync {
    /// Run one cycle, abandoning it once `cancel` fires.
    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<SyncStats, SyncError>;
}

#[async_trait]
impl CycleJob for CycleRunner {
    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<SyncStats, SyncError> {
        self.run_once_until_cancelled(cancel).await
    }
}

/// Configuration for the sync scheduler.
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Six-field cron expression (seconds first).
    pub cron_expression: String,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: DEFAULT_SYNC_CRON.into(),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&SyncConfig> for SyncSchedulerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self { cron_expression: config.cron_expression.clone(), ..Self::default() }
    }
}

/// Sync scheduler with explicit lifecycle management.
pub struct SyncScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    config: SyncSchedulerConfig,
    job_id: Uuid,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: Arc<RwLock<CancellationToken>>,
    job: Arc<dyn CycleJob>,
}

impl SyncScheduler {
    /// Create a scheduler firing on `cron_expression` with default timeouts.
    pub async fn new(cron_expression: String, job: Arc<dyn CycleJob>) -> SchedulerResult<Self> {
        let config = SyncSchedulerConfig { cron_expression, ..SyncSchedulerConfig::default() };
        Self::with_config(config, job).await
    }

    /// Create a scheduler with a custom configuration.
    ///
    /// # Errors
    /// Returns [`SchedulerError::JobRegistrationFailed`] if the cron
    /// expression does not parse.
    pub async fn with_config(
        config: SyncSchedulerConfig,
        job: Arc<dyn CycleJob>,
    ) -> SchedulerResult<Self> {
        let raw_scheduler =
            JobScheduler::new().await.map_err(|source| SchedulerError::CreationFailed { source })?;

        let mut scheduler = Self {
            scheduler: Arc::new(RwLock::new(raw_scheduler)),
            config,
            job_id: Uuid::nil(),
            monitor_handle: None,
            cancellation: Arc::new(RwLock::new(CancellationToken::new())),
            job,
        };

        scheduler.job_id = scheduler.register_sync_job().await?;
        Ok(scheduler)
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        *self.cancellation.write().await = cancel.clone();

        let scheduler = self.scheduler.clone();
        let start_timeout = self.config.start_timeout;
        let start_result = tokio::time::timeout(start_timeout, async move {
            let guard = scheduler.write().await;
            guard.start().await
        })
        .await
        .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?;

        start_result.map_err(|source| SchedulerError::StartFailed { source })?;

        let handle = tokio::spawn(async move {
            cancel.cancelled().await;
            debug!("Sync scheduler monitor cancelled");
        });

        self.monitor_handle = Some(handle);
        info!(cron = %self.config.cron_expression, "Sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler, cancel any running cycle and wait for the monitor
    /// task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.read().await.cancel();

        let scheduler = self.scheduler.clone();
        let stop_timeout = self.config.stop_timeout;
        let stop_result = tokio::time::timeout(stop_timeout, async move {
            let mut guard = scheduler.write().await;
            guard.shutdown().await
        })
        .await
        .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?;

        stop_result.map_err(|source| SchedulerError::StopFailed { source })?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        }

        info!("Sync scheduler stopped");
        Ok(())
    }

    /// Returns true when the monitor task is active.
    pub fn is_running(&self) -> bool {
        self.monitor_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    async fn register_sync_job(&mut self) -> SchedulerResult<Uuid> {
        if self.job_id != Uuid::nil() {
            return Ok(self.job_id);
        }

        let job = self.job.clone();
        let cancellation = self.cancellation.clone();

        let job_definition =
            Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
                let job = job.clone();
                let cancellation = cancellation.clone();

                Box::pin(async move {
                    let cancel = cancellation.read().await.clone();
                    if cancel.is_cancelled() {
                        return;
                    }

                    match job.run_cycle(&cancel).await {
                        Ok(stats) => info!(%stats, "Scheduled sync cycle finished"),
                        Err(SyncError::CycleInProgress) => {
                            info!("Sync cycle still running, skipping this trigger");
                        }
                        Err(SyncError::Cancelled) => debug!("Scheduled sync cycle cancelled"),
                        Err(err @ SyncError::Timeout(_)) => {
                            warn!(error = %err, "Scheduled sync cycle timed out");
                        }
                        Err(err) => error!(error = %err, "Scheduled sync cycle failed"),
                    }
                })
            })
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let job_id = job_definition.guid();
        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "Registered sync job");
        Ok(job_id)
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncScheduler dropped while running; cancelling tasks");
            if let Some(handle) = self.monitor_handle.take() {
                handle.abort();
            }
            if let Ok(cancel) = self.cancellation.try_read() {
                cancel.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingJob {
        runs: AtomicUsize,
        result: fn() -> Result<SyncStats, SyncError>,
    }

    impl CountingJob {
        fn new(result: fn() -> Result<SyncStats, SyncError>) -> Self {
            Self { runs: AtomicUsize::new(0), result }
        }

        fn run_count(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CycleJob for CountingJob {
        async fn run_cycle(&self, _cancel: &CancellationToken) -> Result<SyncStats, SyncError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn fast_config() -> SyncSchedulerConfig {
        SyncSchedulerConfig {
            cron_expression: "*/1 * * * * *".into(), // every second
            start_timeout: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_runs_cycles() {
        let job = Arc::new(CountingJob::new(|| Ok(SyncStats::default())));
        let mut scheduler =
            SyncScheduler::with_config(fast_config(), job.clone()).await.expect("scheduler created");

        scheduler.start().await.expect("start succeeds");
        assert!(scheduler.is_running());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.stop().await.expect("stop succeeds");

        assert!(job.run_count() >= 1);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn busy_and_failing_cycles_keep_the_schedule_alive() {
        let job = Arc::new(CountingJob::new(|| Err(SyncError::CycleInProgress)));
        let mut scheduler =
            SyncScheduler::with_config(fast_config(), job.clone()).await.expect("scheduler created");

        scheduler.start().await.expect("start succeeds");
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(scheduler.is_running());
        assert!(job.run_count() >= 2);
        scheduler.stop().await.expect("stop succeeds");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_start_is_rejected() {
        let job = Arc::new(CountingJob::new(|| Ok(SyncStats::default())));
        let mut scheduler =
            SyncScheduler::with_config(fast_config(), job).await.expect("scheduler created");

        scheduler.start().await.expect("first start");
        let err = scheduler.start().await.expect_err("second start fails");
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        scheduler.stop().await.expect("stop succeeds");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_before_start_is_rejected() {
        let job = Arc::new(CountingJob::new(|| Ok(SyncStats::default())));
        let mut scheduler =
            SyncScheduler::with_config(fast_config(), job).await.expect("scheduler created");

        assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_cron_expression_is_rejected() {
        let job = Arc::new(CountingJob::new(|| Ok(SyncStats::default())));
        let config =
            SyncSchedulerConfig { cron_expression: "every hour".into(), ..fast_config() };

        let result = SyncScheduler::with_config(config, job).await;
        assert!(matches!(result, Err(SchedulerError::JobRegistrationFailed { .. })));
    }
}
