//! Statistics reported by sync cycles and the event log

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome counters of one sync cycle.
///
/// Returned by value from each run, so repeated or concurrent cycles never
/// share counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncStats {
    /// Entries folded into the aggregates and marked done.
    pub updated: u64,
    /// Entries with no tracked deployment, marked skipped.
    pub skipped: u64,
    /// Entries that failed validation and were left pending.
    pub malformed: u64,
    /// Entries left pending after a store failure or timeout.
    pub failed: u64,
}

impl SyncStats {
    /// Entries that left the pending state in this cycle.
    pub fn consumed(&self) -> u64 {
        self.updated + self.skipped
    }

    /// Entries still pending after this cycle.
    pub fn left_pending(&self) -> u64 {
        self.malformed + self.failed
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Updated: {}, Skipped: {}", self.updated, self.skipped)?;
        if self.left_pending() > 0 {
            write!(f, " (malformed: {}, failed: {})", self.malformed, self.failed)?;
        }
        Ok(())
    }
}

/// Entry counts of the execution log by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventLogCounts {
    pub pending: i64,
    pub done: i64,
    pub skipped: i64,
}
