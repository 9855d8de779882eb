//! One pass over the pending execution log

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use metasync_domain::{EntryStatus, Invocation, LogEntry, SyncConfig, SyncStats};
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::errors::SyncError;
use super::pending::pending_entries;
use super::ports::{AggregateStore, EventSource, PricingCatalog};
use super::resolver::{EntryResolver, Resolution};
use crate::aggregation::AggregationUpdater;
use crate::cost::CostModel;

/// Tuning of a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCycleConfig {
    pub page_size: usize,
    pub max_concurrent_entries: usize,
    pub entry_timeout: Duration,
    pub cycle_timeout: Duration,
}

impl Default for SyncCycleConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncCycleConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_concurrent_entries: config.max_concurrent_entries,
            entry_timeout: config.entry_timeout(),
            cycle_timeout: config.cycle_timeout(),
        }
    }
}

/// How a single entry left the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Updated,
    Skipped,
    Malformed,
    Failed,
}

/// Reconciles pending log entries into the tier aggregates.
///
/// Each entry is resolved to its deployment, costed, folded into all three
/// tiers and then marked. An entry is marked `Done` only after its tier
/// update has been committed, so any failure before that point leaves it
/// pending for the next cycle.
pub struct SyncCycle {
    events: Arc<dyn EventSource>,
    store: Arc<dyn AggregateStore>,
    resolver: EntryResolver,
    cost_model: CostModel,
    updater: AggregationUpdater,
    config: SyncCycleConfig,
    gate: TokioMutex<()>,
}

impl SyncCycle {
    pub fn new(
        events: Arc<dyn EventSource>,
        store: Arc<dyn AggregateStore>,
        pricing: Arc<dyn PricingCatalog>,
        config: SyncCycleConfig,
    ) -> Self {
        Self {
            resolver: EntryResolver::new(Arc::clone(&store)),
            cost_model: CostModel::new(pricing),
            updater: AggregationUpdater::new(Arc::clone(&store)),
            events,
            store,
            config,
            gate: TokioMutex::new(()),
        }
    }

    pub fn config(&self) -> SyncCycleConfig {
        self.config
    }

    /// Run one cycle over every pending entry.
    ///
    /// # Errors
    /// - [`SyncError::CycleInProgress`] if another `run` on this instance has
    ///   not finished
    /// - [`SyncError::StoreUnreachable`] if a store cannot be reached; entries
    ///   already marked stay marked
    /// - [`SyncError::Timeout`] when the cycle deadline passes
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SyncStats, SyncError> {
        let _gate = self.gate.try_lock().map_err(|_| SyncError::CycleInProgress)?;
        let started = Instant::now();

        let stats = match tokio::time::timeout(self.config.cycle_timeout, self.run_entries()).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout_secs = self.config.cycle_timeout.as_secs(), "sync_cycle.timeout");
                return Err(SyncError::Timeout(self.config.cycle_timeout));
            }
        };

        info!(
            updated = stats.updated,
            skipped = stats.skipped,
            malformed = stats.malformed,
            failed = stats.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sync_cycle.completed"
        );
        Ok(stats)
    }

    /// [`SyncCycle::run`], abandoned with [`SyncError::Cancelled`] once
    /// `cancel` fires.
    ///
    /// In-flight entries are dropped at their next await point. An entry
    /// whose tier update committed but whose mark did not is finished by the
    /// next cycle without being counted twice.
    pub async fn run_until_cancelled(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SyncStats, SyncError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("sync_cycle.cancelled");
                Err(SyncError::Cancelled)
            }
            result = self.run() => result,
        }
    }

    async fn run_entries(&self) -> Result<SyncStats, SyncError> {
        let mut stats = SyncStats::default();

        let outcomes = pending_entries(Arc::clone(&self.events), self.config.page_size)
            .map(|item| async move {
                match item {
                    Ok(entry) => self.process_with_timeout(entry).await,
                    Err(err) => Err(SyncError::from(err)),
                }
            })
            .buffer_unordered(self.config.max_concurrent_entries.max(1));
        futures::pin_mut!(outcomes);

        while let Some(outcome) = outcomes.next().await {
            match outcome? {
                EntryOutcome::Updated => stats.updated += 1,
                EntryOutcome::Skipped => stats.skipped += 1,
                EntryOutcome::Malformed => stats.malformed += 1,
                EntryOutcome::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn process_with_timeout(&self, entry: LogEntry) -> Result<EntryOutcome, SyncError> {
        let entry_id = entry.id;
        match tokio::time::timeout(self.config.entry_timeout, self.process_entry(&entry)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    entry_id,
                    timeout_secs = self.config.entry_timeout.as_secs(),
                    "sync_cycle.entry_timeout"
                );
                Ok(EntryOutcome::Failed)
            }
        }
    }

    /// Entry-scoped failures become [`EntryOutcome::Failed`]; only fatal
    /// errors are returned.
    async fn process_entry(&self, entry: &LogEntry) -> Result<EntryOutcome, SyncError> {
        let invocation = match entry.validate() {
            Ok(invocation) => invocation,
            Err(defect) => {
                let err = SyncError::MalformedEntry { entry_id: entry.id, defect };
                warn!(entry_id = entry.id, error = %err, "sync_cycle.malformed_entry");
                return Ok(EntryOutcome::Malformed);
            }
        };

        match self.apply_invocation(&invocation).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(entry_id = invocation.entry_id, error = %err, "sync_cycle.entry_failed");
                Ok(EntryOutcome::Failed)
            }
        }
    }

    async fn apply_invocation(&self, invocation: &Invocation) -> Result<EntryOutcome, SyncError> {
        let entry_id = invocation.entry_id;

        let deployment = match self.resolver.resolve(invocation).await? {
            Resolution::Found(deployment) => deployment,
            Resolution::NotFound => {
                self.mark(entry_id, EntryStatus::Skipped).await?;
                return Ok(EntryOutcome::Skipped);
            }
        };

        // Committed by an earlier cycle that stopped before marking.
        if self.store.is_applied(entry_id).await? {
            debug!(entry_id, "sync_cycle.already_applied");
            self.mark(entry_id, EntryStatus::Done).await?;
            return Ok(EntryOutcome::Updated);
        }

        let cost = self.cost_model.cost_for(invocation, &deployment).await?;
        self.updater
            .apply(&deployment, invocation, cost)
            .await
            .map_err(|err| SyncError::tier_update(entry_id, err))?;

        self.mark(entry_id, EntryStatus::Done).await?;
        Ok(EntryOutcome::Updated)
    }

    async fn mark(&self, entry_id: i64, status: EntryStatus) -> Result<(), SyncError> {
        self.events
            .mark_status(entry_id, status)
            .await
            .map_err(|err| SyncError::marking(entry_id, err))
    }
}
