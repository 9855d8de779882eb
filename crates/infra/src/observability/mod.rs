//! Observability infrastructure for sync cycle metrics
//!
//! Structured logging goes through `tracing` everywhere; this module holds
//! the in-process counters that the runner and scheduler update and that
//! `metasync status` reports.
//!
//! ## Design Principles
//!
//! 1. **Poison Recovery**: mutex locks recover the inner value and log a
//!    warning instead of panicking.
//! 2. **Result Returns**: record methods return `MetricsResult<()>` so callers
//!    log and continue when a metric cannot be recorded.
//! 3. **Ring Buffers**: duration samples live in a bounded `VecDeque`.

pub mod metrics;

/// Metrics error type
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Empty data set, cannot calculate aggregate metric
    #[error("Empty data: cannot calculate {metric}")]
    EmptyData {
        /// Metric name that failed (e.g., "P95", "average")
        metric: &'static str,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Log a failed metric recording and continue.
pub(crate) fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        tracing::warn!(metric = metric, error = ?err, "Failed to record metric");
    }
}
