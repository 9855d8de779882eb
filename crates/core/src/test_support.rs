//! In-memory port implementations shared by unit tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use metasync_domain::constants::EXEC_ENTRY_TYPE;
use metasync_domain::{
    DeploymentRecord, EntryStatus, ImplementationRecord, Invocation, LineageHint, LogEntry,
    MetaSyncError, PricingEntry, Provider, Result, TierLineage, TierStats, TypeRecord,
};
use tokio::sync::Mutex as TokioMutex;

use crate::sync::ports::{AggregateStore, EventSource, PricingCatalog};

/// Fresh lineage whose three rows all use `id`.
pub fn lineage(id: i64, external_id: &str) -> TierLineage {
    TierLineage {
        deployment: DeploymentRecord {
            id,
            external_id: external_id.to_string(),
            implementation_id: Some(id),
            memory_size_mb: Some(256),
            stats: TierStats::default(),
            avg_runtime: 0.0,
            avg_loop_counter: 0,
        },
        implementation: ImplementationRecord {
            id,
            name: format!("aws.fn{id}.type{id}"),
            type_id: id,
            provider: Provider::Aws,
            stats: TierStats::default(),
        },
        function_type: TypeRecord {
            id,
            name: format!("fn{id}"),
            type_name: format!("type{id}"),
            stats: TierStats::default(),
        },
    }
}

/// Valid pending log entry.
pub fn log_entry(id: i64, external_id: &str, rtt_ms: i64, success: bool) -> LogEntry {
    let mut entry = LogEntry::new_exec(id, external_id);
    entry.rtt_ms = Some(rtt_ms);
    entry.success = Some(success);
    entry
}

pub fn invocation(id: i64, external_id: &str, rtt_ms: i64, success: bool) -> Invocation {
    log_entry(id, external_id, rtt_ms, success).validate().expect("valid test entry")
}

#[derive(Default)]
struct TierTables {
    deployments: BTreeMap<i64, DeploymentRecord>,
    implementations: BTreeMap<i64, ImplementationRecord>,
    types: BTreeMap<i64, TypeRecord>,
    applied: HashSet<i64>,
}

impl TierTables {
    fn next_id<T>(map: &BTreeMap<i64, T>) -> i64 {
        map.keys().next_back().map_or(1, |id| id + 1)
    }

    fn link(&mut self, deployment_id: i64, hint: &LineageHint) -> i64 {
        let existing_type = self
            .types
            .values()
            .find(|t| t.name == hint.function_name && t.type_name == hint.function_type)
            .map(|t| t.id);
        let type_id = match existing_type {
            Some(id) => id,
            None => {
                let id = Self::next_id(&self.types);
                self.types.insert(
                    id,
                    TypeRecord {
                        id,
                        name: hint.function_name.clone(),
                        type_name: hint.function_type.clone(),
                        stats: TierStats::default(),
                    },
                );
                id
            }
        };

        let name = hint.implementation_name();
        let existing_implementation = self
            .implementations
            .values()
            .find(|i| i.type_id == type_id && i.provider == hint.provider && i.name == name)
            .map(|i| i.id);
        let implementation_id = match existing_implementation {
            Some(id) => id,
            None => {
                let id = Self::next_id(&self.implementations);
                self.implementations.insert(
                    id,
                    ImplementationRecord {
                        id,
                        name,
                        type_id,
                        provider: hint.provider,
                        stats: TierStats::default(),
                    },
                );
                id
            }
        };

        if let Some(deployment) = self.deployments.get_mut(&deployment_id) {
            deployment.implementation_id = Some(implementation_id);
        }
        implementation_id
    }
}

/// Aggregate store backed by maps, with failure toggles.
#[derive(Default)]
pub struct InMemoryAggregateStore {
    tables: TokioMutex<TierTables>,
    fail_commit: bool,
    unavailable: bool,
    commits: AtomicUsize,
}

impl InMemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn with_unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub async fn insert_lineage(&self, lineage: TierLineage) -> DeploymentRecord {
        let mut tables = self.tables.lock().await;
        tables.types.insert(lineage.function_type.id, lineage.function_type);
        tables.implementations.insert(lineage.implementation.id, lineage.implementation);
        tables.deployments.insert(lineage.deployment.id, lineage.deployment.clone());
        lineage.deployment
    }

    pub async fn insert_deployment_under(
        &self,
        implementation_id: i64,
        external_id: &str,
    ) -> DeploymentRecord {
        let mut tables = self.tables.lock().await;
        let id = TierTables::next_id(&tables.deployments);
        let deployment = DeploymentRecord {
            id,
            external_id: external_id.to_string(),
            implementation_id: Some(implementation_id),
            memory_size_mb: Some(256),
            stats: TierStats::default(),
            avg_runtime: 0.0,
            avg_loop_counter: 0,
        };
        tables.deployments.insert(id, deployment.clone());
        deployment
    }

    pub async fn insert_unlinked_deployment(
        &self,
        external_id: &str,
        memory_size_mb: i32,
    ) -> DeploymentRecord {
        let mut tables = self.tables.lock().await;
        let id = TierTables::next_id(&tables.deployments);
        let deployment = DeploymentRecord {
            id,
            external_id: external_id.to_string(),
            implementation_id: None,
            memory_size_mb: Some(memory_size_mb),
            stats: TierStats::default(),
            avg_runtime: 0.0,
            avg_loop_counter: 0,
        };
        tables.deployments.insert(id, deployment.clone());
        deployment
    }

    /// Current persisted lineage of a linked deployment.
    pub async fn lineage_of(&self, deployment_id: i64) -> TierLineage {
        self.load_lineage(deployment_id, None).await.expect("linked deployment")
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(MetaSyncError::Unavailable("metadata store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for InMemoryAggregateStore {
    async fn find_deployment(&self, external_id: &str) -> Result<Option<DeploymentRecord>> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables.deployments.values().find(|d| d.external_id == external_id).cloned())
    }

    async fn load_lineage(
        &self,
        deployment_id: i64,
        hint: Option<&LineageHint>,
    ) -> Result<TierLineage> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;

        let deployment = tables
            .deployments
            .get(&deployment_id)
            .cloned()
            .ok_or_else(|| MetaSyncError::NotFound(format!("deployment {deployment_id}")))?;
        let implementation_id = match (deployment.implementation_id, hint) {
            (Some(id), _) => id,
            (None, Some(hint)) => tables.link(deployment_id, hint),
            (None, None) => {
                return Err(MetaSyncError::InvalidInput(format!(
                    "deployment {deployment_id} has no implementation"
                )))
            }
        };

        let deployment = tables.deployments.get(&deployment_id).cloned().unwrap_or(deployment);
        let implementation = tables
            .implementations
            .get(&implementation_id)
            .cloned()
            .ok_or_else(|| MetaSyncError::NotFound(format!("implementation {implementation_id}")))?;
        let function_type = tables
            .types
            .get(&implementation.type_id)
            .cloned()
            .ok_or_else(|| MetaSyncError::NotFound(format!("type {}", implementation.type_id)))?;

        Ok(TierLineage { deployment, implementation, function_type })
    }

    async fn is_applied(&self, entry_id: i64) -> Result<bool> {
        self.check_available()?;
        Ok(self.tables.lock().await.applied.contains(&entry_id))
    }

    async fn commit_lineage(&self, entry_id: i64, updated: &TierLineage) -> Result<()> {
        self.check_available()?;
        if self.fail_commit {
            return Err(MetaSyncError::Database("disk I/O error".into()));
        }

        let mut tables = self.tables.lock().await;
        let stored = (
            tables.deployments.get(&updated.deployment.id).map(|d| d.stats.invocations),
            tables.implementations.get(&updated.implementation.id).map(|i| i.stats.invocations),
            tables.types.get(&updated.function_type.id).map(|t| t.stats.invocations),
        );
        let expected = (
            Some(updated.deployment.stats.invocations - 1),
            Some(updated.implementation.stats.invocations - 1),
            Some(updated.function_type.stats.invocations - 1),
        );
        if stored != expected {
            return Err(MetaSyncError::Conflict(format!(
                "lineage of deployment {} changed concurrently",
                updated.deployment.id
            )));
        }
        if !tables.applied.insert(entry_id) {
            return Err(MetaSyncError::Conflict(format!("entry {entry_id} already applied")));
        }

        tables.deployments.insert(updated.deployment.id, updated.deployment.clone());
        tables.implementations.insert(updated.implementation.id, updated.implementation.clone());
        tables.types.insert(updated.function_type.id, updated.function_type.clone());
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Event log backed by a map, with failure toggles.
#[derive(Default)]
pub struct InMemoryEventLog {
    entries: TokioMutex<BTreeMap<i64, LogEntry>>,
    marks: TokioMutex<Vec<(i64, EntryStatus)>>,
    fail_mark_for: TokioMutex<HashSet<i64>>,
    fail_select: bool,
}

impl InMemoryEventLog {
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self {
            entries: TokioMutex::new(entries.into_iter().map(|e| (e.id, e)).collect()),
            ..Self::default()
        }
    }

    pub fn with_fail_select(mut self) -> Self {
        self.fail_select = true;
        self
    }

    /// Make `mark_status` fail once for `entry_id`.
    pub async fn fail_next_mark(&self, entry_id: i64) {
        self.fail_mark_for.lock().await.insert(entry_id);
    }

    pub async fn status_of(&self, entry_id: i64) -> Option<EntryStatus> {
        self.entries.lock().await.get(&entry_id).map(|e| e.status)
    }

    pub async fn marks(&self) -> Vec<(i64, EntryStatus)> {
        self.marks.lock().await.clone()
    }
}

#[async_trait]
impl EventSource for InMemoryEventLog {
    async fn select_pending(&self, after: Option<i64>, limit: usize) -> Result<Vec<LogEntry>> {
        if self.fail_select {
            return Err(MetaSyncError::Unavailable("event log offline".into()));
        }
        let entries = self.entries.lock().await;
        Ok(entries
            .values()
            .filter(|e| after.map_or(true, |cursor| e.id > cursor))
            .filter(|e| {
                e.status == EntryStatus::Pending
                    && e.entry_type == EXEC_ENTRY_TYPE
                    && e.external_id.is_some()
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_status(&self, entry_id: i64, status: EntryStatus) -> Result<()> {
        if self.fail_mark_for.lock().await.remove(&entry_id) {
            return Err(MetaSyncError::Database(format!("mark failed for {entry_id}")));
        }
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(&entry_id)
            .ok_or_else(|| MetaSyncError::NotFound(format!("log entry {entry_id}")))?;
        entry.status = status;
        self.marks.lock().await.push((entry_id, status));
        Ok(())
    }
}

/// Pricing catalog with fixed entries that counts lookups.
#[derive(Default)]
pub struct StaticCatalog {
    entries: HashMap<Provider, PricingEntry>,
    lookups: Arc<AtomicUsize>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<PricingEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|entry| (entry.provider, entry)).collect(),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PricingCatalog for StaticCatalog {
    async fn pricing_for(&self, provider: Provider) -> Result<Option<PricingEntry>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.get(&provider).cloned())
    }
}
