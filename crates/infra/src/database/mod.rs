//! Database implementations

pub mod event_log_repository;
pub mod manager;
pub mod metadata_repository;
pub mod pool;
pub mod pricing_repository;

pub use event_log_repository::SqliteEventLog;
pub use manager::DbManager;
pub use metadata_repository::SqliteAggregateStore;
pub use pool::{create_sqlite_pool, PoolSettings, SqliteConnection, SqlitePool};
pub use pricing_repository::SqlitePricingCatalog;
