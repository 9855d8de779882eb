//! # metasync Domain
//!
//! Business domain types for the invocation metadata sync engine.
//!
//! This crate contains:
//! - Execution log entries and their validated form
//! - Tier aggregate records (type, implementation, deployment)
//! - Pricing entries and cost values
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other metasync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
