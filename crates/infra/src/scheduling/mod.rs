//! Scheduling infrastructure for the periodic sync trigger
//!
//! The scheduler follows the runtime rules used across this crate:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on all async operations

pub mod error;
pub mod sync_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use sync_scheduler::{CycleJob, SyncScheduler, SyncSchedulerConfig};
