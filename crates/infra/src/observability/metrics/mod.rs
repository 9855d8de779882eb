//! Metrics collection modules
//!
//! Thread-safe metrics for the sync subsystem.

pub mod cycle;

pub use cycle::{CycleMetrics, CycleMetricsSnapshot};
