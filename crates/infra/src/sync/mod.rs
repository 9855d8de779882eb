//! Sync infrastructure
//!
//! Runs the core sync cycle against the SQLite stores under the
//! cross-process cycle lock.

pub mod runner;

pub use runner::CycleRunner;
