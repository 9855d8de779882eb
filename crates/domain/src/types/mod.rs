//! Domain types and models

pub mod log_entry;
pub mod pricing;
pub mod provider;
pub mod stats;
pub mod tiers;

pub use log_entry::{EntryDefect, EntryStatus, Invocation, LogEntry, LogEvent, LoopScope};
pub use pricing::{Cost, PricingEntry, PricingModel};
pub use provider::Provider;
pub use stats::{EventLogCounts, SyncStats};
pub use tiers::{
    DeploymentRecord, ImplementationRecord, LineageHint, TierLineage, TierStats, TypeRecord,
};
