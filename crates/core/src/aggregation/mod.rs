//! Running-average maintenance across the type, implementation and
//! deployment tiers

pub mod locks;
pub mod mean;
pub mod updater;

pub use locks::TierLocks;
pub use mean::{
    effective_loop_value, running_loop_counter, running_mean, running_success_rate, LoopRounding,
    LOOP_COUNTER_ROUNDING,
};
pub use updater::{fold_deployment, fold_lineage, fold_stats, AggregationUpdater, Observation};
