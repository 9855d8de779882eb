//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for metasync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum MetaSyncError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing store could not be reached (connection refused, pool
    /// exhausted, file locked).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A concurrent writer changed a row between read and write.
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MetaSyncError {
    /// Returns true when the error means the store itself is unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type alias for metasync operations
pub type Result<T> = std::result::Result<T, MetaSyncError>;
