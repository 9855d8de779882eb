//! Port interfaces for sync operations

use async_trait::async_trait;
use metasync_domain::{
    DeploymentRecord, EntryStatus, LineageHint, LogEntry, PricingEntry, Provider, Result,
    TierLineage,
};

/// Execution log holding the entries to consume.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Select pending `EXEC` entries that carry an external id.
    ///
    /// Entries are returned in ascending id order, starting after `after`
    /// (exclusive) when given, at most `limit` of them.
    async fn select_pending(&self, after: Option<i64>, limit: usize) -> Result<Vec<LogEntry>>;

    /// Set the status of a single entry. Re-setting the same status is a
    /// no-op; an unknown id is `NotFound`.
    async fn mark_status(&self, entry_id: i64, status: EntryStatus) -> Result<()>;
}

/// Relational store of the type, implementation and deployment tiers.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Look up a deployment by external id.
    async fn find_deployment(&self, external_id: &str) -> Result<Option<DeploymentRecord>>;

    /// Read a deployment with its implementation and type.
    ///
    /// A deployment without an implementation link is linked using `hint`,
    /// creating the implementation and type rows when they do not exist.
    /// Without a hint such a deployment yields `InvalidInput`.
    async fn load_lineage(
        &self,
        deployment_id: i64,
        hint: Option<&LineageHint>,
    ) -> Result<TierLineage>;

    /// Whether the log entry has already been folded into the aggregates.
    async fn is_applied(&self, entry_id: i64) -> Result<bool>;

    /// Persist all three rows of `updated` and record `entry_id` as applied,
    /// atomically.
    ///
    /// Each row is written only if its stored invocation count is exactly one
    /// less than the new count; otherwise nothing is written and the store
    /// returns `Conflict`.
    async fn commit_lineage(&self, entry_id: i64, updated: &TierLineage) -> Result<()>;
}

/// Read-only lookup of provider billing parameters.
#[async_trait]
pub trait PricingCatalog: Send + Sync {
    async fn pricing_for(&self, provider: Provider) -> Result<Option<PricingEntry>>;
}
