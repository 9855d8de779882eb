//! Billing formula strategies
//!
//! Each [`PricingModel`] maps to one [`CostFormula`]. Adding a billing model
//! means adding a variant and a formula here; [`super::CostModel`] never
//! inspects the provider.

use std::fmt::Debug;

use metasync_domain::constants::{FREQUENCY_STEPS, MAX_ALLOCATED_GHZ};
use metasync_domain::{PricingEntry, PricingModel};

/// Memory and billed runtime of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BilledUsage {
    pub memory_mb: i32,
    /// Runtime already rounded up to the billing unit.
    pub billed_ms: i64,
}

impl BilledUsage {
    fn gb(self) -> f64 {
        f64::from(self.memory_mb) / 1000.0
    }

    fn seconds(self) -> f64 {
        self.billed_ms as f64 / 1000.0
    }
}

/// Strategy computing the cost of one invocation.
pub trait CostFormula: Send + Sync + Debug {
    fn charge(&self, pricing: &PricingEntry, usage: BilledUsage) -> f64;
}

/// Invocation fee plus GB-seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearFormula;

impl CostFormula for LinearFormula {
    fn charge(&self, pricing: &PricingEntry, usage: BilledUsage) -> f64 {
        pricing.invocation_cost + usage.gb() * usage.seconds() * pricing.duration_cost_per_gb_second
    }
}

/// Linear cost plus GHz-seconds of the frequency allocated with the memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyTierFormula;

impl CostFormula for FrequencyTierFormula {
    fn charge(&self, pricing: &PricingEntry, usage: BilledUsage) -> f64 {
        let base = LinearFormula.charge(pricing, usage);
        let ghz_rate = pricing.duration_cost_per_ghz_second.unwrap_or(0.0);
        base + allocated_ghz(usage.memory_mb) * usage.seconds() * ghz_rate
    }
}

/// Formula implementing a pricing model.
pub fn formula_for(model: PricingModel) -> &'static dyn CostFormula {
    match model {
        PricingModel::Linear => &LinearFormula,
        PricingModel::LinearWithFrequencyTier => &FrequencyTierFormula,
    }
}

/// CPU frequency in GHz allocated with `memory_mb` of memory.
pub fn allocated_ghz(memory_mb: i32) -> f64 {
    FREQUENCY_STEPS
        .iter()
        .find(|(bound, _)| memory_mb < *bound)
        .map_or(MAX_ALLOCATED_GHZ, |(_, ghz)| *ghz)
}

/// Round `runtime_ms` up to the next multiple of `unit_ms`. Units below one
/// millisecond disable rounding.
///
/// Returns `None` when the rounded runtime does not fit in an `i64`.
pub fn round_to_billing_unit(runtime_ms: i64, unit_ms: i64) -> Option<i64> {
    let runtime_ms = runtime_ms.max(0);
    if unit_ms <= 1 {
        return Some(runtime_ms);
    }
    let units = runtime_ms / unit_ms + i64::from(runtime_ms % unit_ms != 0);
    units.checked_mul(unit_ms)
}
