//! Domain constants
//!
//! Sentinels and fixed tables shared by the event log, the cost model and the
//! aggregation policy.

/// Stored in `precomputed_cost` to mean "no cost supplied by the producer".
pub const UNKNOWN_COST: f64 = -1.0;

/// `max_loop_counter` value of an invocation outside any parallel loop.
pub const NO_LOOP: i32 = -1;

/// Log entry type selected for aggregation.
pub const EXEC_ENTRY_TYPE: &str = "EXEC";

/// Payload key carrying the measured function runtime in milliseconds.
pub const OUTPUT_RUNTIME_KEY: &str = "runtime";

/// Allocated CPU frequency (GHz) by memory size (MB), for providers that bill
/// compute frequency separately. Each row is `(upper bound exclusive, GHz)`;
/// memory at or above the last bound gets [`MAX_ALLOCATED_GHZ`].
pub const FREQUENCY_STEPS: [(i32, f64); 5] =
    [(256, 0.2), (512, 0.4), (1024, 0.8), (2048, 1.4), (4096, 2.4)];

/// Frequency allocated to memory sizes of 4096 MB and above.
pub const MAX_ALLOCATED_GHZ: f64 = 4.8;

/// Default cadence of the periodic sync trigger: top of every hour.
pub const DEFAULT_SYNC_CRON: &str = "0 0 * * * *";
