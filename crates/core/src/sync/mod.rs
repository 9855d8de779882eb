//! Sync cycle: consume pending log entries into the tier aggregates

pub mod cycle;
pub mod errors;
pub mod pending;
pub mod ports;
pub mod resolver;

pub use cycle::{SyncCycle, SyncCycleConfig};
pub use errors::{SyncError, SyncErrorCategory};
pub use pending::pending_entries;
pub use ports::{AggregateStore, EventSource, PricingCatalog};
pub use resolver::{EntryResolver, Resolution};
