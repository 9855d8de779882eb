//! Sync cycle metrics
//!
//! Tracks how often cycles run, how they end, how long they take and how many
//! entries they consume.
//!
//! ## Design
//! - **Atomic counters** for per-outcome counts
//! - **VecDeque ring buffer** of recent durations for percentile calculations
//! - **Poison-safe locking** with explicit match pattern (no .expect())

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use metasync_domain::SyncStats;
use serde::Serialize;

use crate::observability::{MetricsError, MetricsResult};

const MAX_DURATION_SAMPLES: usize = 256;

/// Counters of the sync cycles run by this process.
#[derive(Debug)]
pub struct CycleMetrics {
    /// Cycles that ran to completion
    pub completed: AtomicU64,
    /// Cycles aborted by a store failure
    pub failed: AtomicU64,
    /// Cycles cut off by the cycle timeout
    pub timeouts: AtomicU64,
    /// Trigger firings skipped because another cycle held the lock
    pub lock_contention: AtomicU64,
    pub entries_updated: AtomicU64,
    pub entries_skipped: AtomicU64,
    /// Entries left pending (malformed or failed) summed over all cycles
    pub entries_left_pending: AtomicU64,
    pub last_duration_ms: AtomicU64,
    total_duration_ms: AtomicU64,
    durations: Mutex<VecDeque<u64>>,
}

/// Point-in-time copy of [`CycleMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CycleMetricsSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub lock_contention: u64,
    pub entries_updated: u64,
    pub entries_skipped: u64,
    pub entries_left_pending: u64,
    pub last_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl Default for CycleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleMetrics {
    pub fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            lock_contention: AtomicU64::new(0),
            entries_updated: AtomicU64::new(0),
            entries_skipped: AtomicU64::new(0),
            entries_left_pending: AtomicU64::new(0),
            last_duration_ms: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            durations: Mutex::new(VecDeque::with_capacity(MAX_DURATION_SAMPLES)),
        }
    }

    /// Record a completed cycle and fold its counters into the totals.
    pub fn record_completed(&self, stats: &SyncStats, elapsed: Duration) -> MetricsResult<()> {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.entries_updated.fetch_add(stats.updated, Ordering::Relaxed);
        self.entries_skipped.fetch_add(stats.skipped, Ordering::Relaxed);
        self.entries_left_pending.fetch_add(stats.left_pending(), Ordering::Relaxed);
        self.record_duration(elapsed)
    }

    /// Record a cycle aborted by an error other than a timeout.
    pub fn record_failed(&self, elapsed: Duration) -> MetricsResult<()> {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_duration(elapsed)
    }

    pub fn record_timeout(&self, elapsed: Duration) -> MetricsResult<()> {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.record_duration(elapsed)
    }

    pub fn record_lock_contention(&self) -> MetricsResult<()> {
        self.lock_contention.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn record_duration(&self, elapsed: Duration) -> MetricsResult<()> {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.last_duration_ms.store(ms, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);

        let mut durations = match self.durations.lock() {
            Ok(guard) => guard,
            Err(poison_err) => {
                tracing::warn!("Cycle duration mutex poisoned, recovering");
                poison_err.into_inner()
            }
        };
        if durations.len() == MAX_DURATION_SAMPLES {
            durations.pop_front();
        }
        durations.push_back(ms);
        Ok(())
    }

    /// Cycles that ended, whatever the outcome.
    pub fn total_cycles(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
            + self.timeouts.load(Ordering::Relaxed)
    }

    /// P95 of the recent cycle durations in milliseconds
    ///
    /// Returns `Err(MetricsError::EmptyData)` if no cycle has ended yet.
    pub fn p95_duration_ms(&self) -> MetricsResult<u64> {
        let durations = match self.durations.lock() {
            Ok(guard) => guard,
            Err(poison_err) => {
                tracing::warn!("Cycle duration mutex poisoned, recovering");
                poison_err.into_inner()
            }
        };
        if durations.is_empty() {
            return Err(MetricsError::EmptyData { metric: "P95" });
        }

        let mut sorted: Vec<u64> = durations.iter().copied().collect();
        sorted.sort_unstable();
        let index = (sorted.len() * 95).div_ceil(100).saturating_sub(1);
        Ok(sorted[index])
    }

    pub fn snapshot(&self) -> CycleMetricsSnapshot {
        CycleMetricsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            lock_contention: self.lock_contention.load(Ordering::Relaxed),
            entries_updated: self.entries_updated.load(Ordering::Relaxed),
            entries_skipped: self.entries_skipped.load(Ordering::Relaxed),
            entries_left_pending: self.entries_left_pending.load(Ordering::Relaxed),
            last_duration_ms: self.last_duration_ms.load(Ordering::Relaxed),
            total_duration_ms: self.total_duration_ms.load(Ordering::Relaxed),
        }
    }
}
