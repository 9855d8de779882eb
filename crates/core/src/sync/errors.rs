//! Sync-specific error types
//!
//! Classifies cycle failures into those that abort the whole cycle and
//! those confined to a single log entry.

use std::time::Duration;

use metasync_domain::{EntryDefect, MetaSyncError};
use thiserror::Error;

/// Categories of sync errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorCategory {
    /// A store could not be reached - the cycle stops, the next one retries
    Connectivity,
    /// Storage rejected an operation - the entry stays pending
    Storage,
    /// The entry itself cannot be aggregated - never retried automatically
    Data,
    /// Deadline or cancellation
    Interrupted,
    /// Another cycle is running
    Busy,
}

/// Sync cycle errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store unreachable: {0}")]
    StoreUnreachable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Malformed log entry {entry_id}: {defect}")]
    MalformedEntry { entry_id: i64, defect: EntryDefect },

    #[error("Tier update failed for entry {entry_id}: {message}")]
    TierUpdate { entry_id: i64, message: String },

    #[error("Could not mark entry {entry_id}: {message}")]
    Marking { entry_id: i64, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("A sync cycle is already in progress")]
    CycleInProgress,

    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Wrap a failed tier update. An unreachable store stays fatal.
    pub fn tier_update(entry_id: i64, err: MetaSyncError) -> Self {
        match err {
            MetaSyncError::Unavailable(message) => Self::StoreUnreachable(message),
            other => Self::TierUpdate { entry_id, message: other.to_string() },
        }
    }

    /// Wrap a failed status update. An unreachable store stays fatal.
    pub fn marking(entry_id: i64, err: MetaSyncError) -> Self {
        match err {
            MetaSyncError::Unavailable(message) => Self::StoreUnreachable(message),
            other => Self::Marking { entry_id, message: other.to_string() },
        }
    }

    pub fn category(&self) -> SyncErrorCategory {
        match self {
            Self::StoreUnreachable(_) => SyncErrorCategory::Connectivity,
            Self::Store(_) | Self::TierUpdate { .. } | Self::Marking { .. } => {
                SyncErrorCategory::Storage
            }
            Self::MalformedEntry { .. } => SyncErrorCategory::Data,
            Self::Timeout(_) | Self::Cancelled => SyncErrorCategory::Interrupted,
            Self::CycleInProgress => SyncErrorCategory::Busy,
        }
    }

    /// Whether the error ends the running cycle instead of a single entry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreUnreachable(_) | Self::Cancelled)
    }

    /// Whether a later cycle is expected to succeed where this one failed.
    pub fn should_retry(&self) -> bool {
        matches!(
            self.category(),
            SyncErrorCategory::Connectivity
                | SyncErrorCategory::Storage
                | SyncErrorCategory::Interrupted
                | SyncErrorCategory::Busy
        )
    }
}

impl From<MetaSyncError> for SyncError {
    fn from(err: MetaSyncError) -> Self {
        match err {
            MetaSyncError::Unavailable(message) => Self::StoreUnreachable(message),
            other => Self::Store(other.to_string()),
        }
    }
}
