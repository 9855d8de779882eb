//! Shared fixtures for infra integration tests.

use std::sync::Arc;

use metasync_domain::{LineageHint, LogEntry, PricingEntry, Provider, SyncConfig};
use metasync_infra::database::{
    DbManager, SqliteAggregateStore, SqliteEventLog, SqlitePricingCatalog,
};
use metasync_infra::observability::metrics::CycleMetrics;
use metasync_infra::sync::CycleRunner;
use tempfile::TempDir;

/// AWS Lambda list price used across the integration tests.
pub fn aws_pricing() -> PricingEntry {
    PricingEntry::linear(Provider::Aws, 0.000_000_2, 0.000_016_666_7, 100)
}

/// Separate event-log and metadata databases in one temporary directory,
/// with migrations applied to both.
pub struct TestStores {
    pub events: Arc<SqliteEventLog>,
    pub store: Arc<SqliteAggregateStore>,
    pub pricing: Arc<SqlitePricingCatalog>,
    pub event_db: Arc<DbManager>,
    pub metadata_db: Arc<DbManager>,
    pub temp_dir: TempDir,
}

impl TestStores {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let event_db = open_db(&temp_dir, "events.db");
        let metadata_db = open_db(&temp_dir, "metadata.db");
        let events = SqliteEventLog::new(Arc::clone(&event_db));
        let log_id = events.identity().await.expect("event log identity should be created");

        Self {
            events: Arc::new(events),
            store: Arc::new(SqliteAggregateStore::new(Arc::clone(&metadata_db), log_id)),
            pricing: Arc::new(SqlitePricingCatalog::new(Arc::clone(&metadata_db))),
            event_db,
            metadata_db,
            temp_dir,
        }
    }

    /// Point at a brand-new event-log file, as if the old one had been
    /// deleted and recreated. The metadata database is kept.
    pub async fn recreate_event_log(&mut self, file_name: &str) {
        self.event_db = open_db(&self.temp_dir, file_name);
        let events = SqliteEventLog::new(Arc::clone(&self.event_db));
        let log_id = events.identity().await.expect("event log identity should be created");
        self.events = Arc::new(events);
        self.store = Arc::new(SqliteAggregateStore::new(Arc::clone(&self.metadata_db), log_id));
    }

    /// Sync settings pointing the cycle lock at the temporary directory.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            lock_dir: self.temp_dir.path().to_string_lossy().into_owned(),
            ..SyncConfig::default()
        }
    }

    pub async fn runner(&self) -> CycleRunner {
        CycleRunner::from_managers(
            Arc::clone(&self.event_db),
            Arc::clone(&self.metadata_db),
            &self.sync_config(),
            Arc::new(CycleMetrics::new()),
        )
        .await
        .expect("runner should open")
    }

    /// Register an AWS deployment linked to implementation `name` of type
    /// `type_name`.
    pub async fn deploy(&self, external_id: &str, memory_mb: i32, name: &str, type_name: &str) {
        let hint = LineageHint {
            function_name: name.to_string(),
            function_type: type_name.to_string(),
            provider: Provider::Aws,
        };
        self.store
            .register_deployment(external_id, Some(memory_mb), Some(hint))
            .await
            .expect("deployment should register");
    }
}

fn open_db(temp_dir: &TempDir, file_name: &str) -> Arc<DbManager> {
    let db = DbManager::new(temp_dir.path().join(file_name), 4).expect("manager should be created");
    db.run_migrations().expect("schema should apply");
    Arc::new(db)
}

/// A measured AWS execution entry.
pub fn exec(external_id: &str, rtt_ms: i64, success: bool) -> LogEntry {
    let mut entry = LogEntry::new_exec(0, external_id);
    entry.provider = Some(Provider::Aws);
    entry.rtt_ms = Some(rtt_ms);
    entry.success = Some(success);
    entry
}
