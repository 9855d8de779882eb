//! Scheduler error types

use std::time::Duration;

use metasync_domain::MetaSyncError;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;
use tokio_cron_scheduler::JobSchedulerError;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    #[error("Failed to create scheduler: {source}")]
    CreationFailed {
        #[source]
        source: JobSchedulerError,
    },

    #[error("Failed to start scheduler: {source}")]
    StartFailed {
        #[source]
        source: JobSchedulerError,
    },

    #[error("Failed to stop scheduler: {source}")]
    StopFailed {
        #[source]
        source: JobSchedulerError,
    },

    /// The cron expression was rejected or the job could not be added
    #[error("Failed to register job: {source}")]
    JobRegistrationFailed {
        #[source]
        source: JobSchedulerError,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        #[source]
        source: Elapsed,
    },

    #[error("Task join failed: {0}")]
    TaskJoinFailed(#[from] JoinError),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let domain_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                MetaSyncError::InvalidInput(err.to_string())
            }
            SchedulerError::JobRegistrationFailed { .. } => MetaSyncError::Config(err.to_string()),
            _ => MetaSyncError::Internal(err.to_string()),
        };
        InfraError(domain_err)
    }
}

impl From<SchedulerError> for MetaSyncError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
