//! Provider billing parameters and computed costs

use serde::{Deserialize, Serialize};

use super::provider::Provider;
use crate::constants::UNKNOWN_COST;
use crate::impl_domain_status_conversions;

/// Billing formula a provider uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    /// Per-invocation fee plus GB-seconds.
    Linear,
    /// [`PricingModel::Linear`] plus GHz-seconds for the CPU frequency
    /// allocated with the memory size.
    LinearWithFrequencyTier,
}

impl_domain_status_conversions!(PricingModel {
    Linear => "linear",
    LinearWithFrequencyTier => "linear_with_frequency_tier",
});

/// Billing parameters of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub provider: Provider,
    pub invocation_cost: f64,
    pub duration_cost_per_gb_second: f64,
    pub duration_cost_per_ghz_second: Option<f64>,
    /// Runtime is rounded up to a multiple of this before billing.
    pub billing_unit_ms: i64,
    pub model: PricingModel,
}

impl PricingEntry {
    /// Linear pricing with the given rates.
    pub fn linear(
        provider: Provider,
        invocation_cost: f64,
        duration_cost_per_gb_second: f64,
        billing_unit_ms: i64,
    ) -> Self {
        Self {
            provider,
            invocation_cost,
            duration_cost_per_gb_second,
            duration_cost_per_ghz_second: None,
            billing_unit_ms,
            model: PricingModel::Linear,
        }
    }
}

/// Result of a cost computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Cost {
    Known(f64),
    Unknown,
}

impl Cost {
    /// Interpret a stored value, where negative values mean unknown.
    pub fn from_raw(raw: f64) -> Self {
        if raw < 0.0 || raw.is_nan() {
            Self::Unknown
        } else {
            Self::Known(raw)
        }
    }

    /// Stored representation; unknown becomes the `-1` sentinel.
    pub fn as_raw(self) -> f64 {
        match self {
            Self::Known(value) => value,
            Self::Unknown => UNKNOWN_COST,
        }
    }

    /// Value to fold into a running cost average.
    ///
    /// Unknown and zero costs are replaced by the tier's current average so
    /// they leave the average unchanged.
    pub fn or_average(self, current_avg: f64) -> f64 {
        match self {
            Self::Known(value) if value != 0.0 => value,
            _ => current_avg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_and_zero_fall_back_to_average() {
        assert_eq!(Cost::Unknown.or_average(0.5), 0.5);
        assert_eq!(Cost::Known(0.0).or_average(0.5), 0.5);
        assert_eq!(Cost::Known(0.25).or_average(0.5), 0.25);
    }

    #[test]
    fn raw_sentinel_round_trips() {
        assert_eq!(Cost::from_raw(-1.0), Cost::Unknown);
        assert_eq!(Cost::Unknown.as_raw(), -1.0);
        assert_eq!(Cost::from_raw(0.002), Cost::Known(0.002));
    }

    #[test]
    fn pricing_model_uses_snake_case_storage() {
        assert_eq!(PricingModel::LinearWithFrequencyTier.to_string(), "linear_with_frequency_tier");
        assert_eq!("LINEAR".parse::<PricingModel>(), Ok(PricingModel::Linear));
    }
}
