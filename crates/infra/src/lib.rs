//! # metasync Infrastructure
//!
//! Infrastructure implementations of the core sync ports.
//!
//! This crate contains:
//! - SQLite stores for the execution log, tier aggregates and pricing
//! - Configuration loading from the environment or a file
//! - The cycle runner, its cross-process lock and its metrics
//! - The cron-based periodic trigger
//! - The producer-side execution logger
//!
//! ## Architecture
//! - Implements traits defined in `metasync-core`
//! - Contains all "impure" code (I/O, filesystem, timers)

pub mod config;
pub mod database;
pub mod errors;
pub mod instance_lock;
pub mod logger;
pub mod observability;
pub mod scheduling;
pub mod sync;

// Re-export commonly used items
pub use database::*;
pub use errors::InfraError;
pub use instance_lock::InstanceLock;
pub use logger::{ExecutionLogger, InvocationRecord};
pub use observability::metrics::{CycleMetrics, CycleMetricsSnapshot};
pub use scheduling::{SchedulerError, SyncScheduler, SyncSchedulerConfig};
pub use sync::CycleRunner;
