//! # metasync Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for the execution log, the tier store and pricing
//! - Cost computation with pluggable pricing formulas
//! - Incremental three-tier aggregation
//! - The sync cycle that ties them together
//!
//! ## Architecture Principles
//! - Only depends on `metasync-domain`
//! - No database or platform code
//! - All external dependencies via traits

pub mod aggregation;
pub mod cost;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use aggregation::{AggregationUpdater, TierLocks};
pub use cost::{CostFormula, CostModel};
pub use sync::ports::{AggregateStore, EventSource, PricingCatalog};
pub use sync::{EntryResolver, Resolution, SyncCycle, SyncCycleConfig, SyncError};
