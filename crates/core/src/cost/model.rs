//! Monetary cost of a single invocation

use std::sync::Arc;

use metasync_domain::{Cost, DeploymentRecord, Invocation, PricingEntry, Provider, Result};
use tracing::debug;

use super::formula::{formula_for, round_to_billing_unit, BilledUsage};
use crate::sync::ports::PricingCatalog;

/// Computes invocation costs from the pricing catalog.
pub struct CostModel {
    catalog: Arc<dyn PricingCatalog>,
}

impl CostModel {
    pub fn new(catalog: Arc<dyn PricingCatalog>) -> Self {
        Self { catalog }
    }

    /// Cost of an invocation on `deployment`.
    ///
    /// A precomputed cost on the invocation is returned as is, without
    /// consulting the catalog. Otherwise memory comes from the deployment
    /// (falling back to the entry) and runtime from the payload (falling back
    /// to the RTT).
    pub async fn cost_for(
        &self,
        invocation: &Invocation,
        deployment: &DeploymentRecord,
    ) -> Result<Cost> {
        if let Some(cost) = invocation.precomputed_cost {
            return Ok(Cost::Known(cost));
        }

        let memory_mb =
            deployment.memory_size_mb.filter(|mb| *mb > 0).or(invocation.memory_size_mb);
        self.cost(memory_mb, invocation.billable_runtime_ms(), invocation.provider).await
    }

    /// Cost of running `runtime_ms` with `memory_mb` on `provider`.
    ///
    /// Unknown memory, an unknown provider, or a provider missing from the
    /// catalog yields [`Cost::Unknown`].
    pub async fn cost(
        &self,
        memory_mb: Option<i32>,
        runtime_ms: i64,
        provider: Provider,
    ) -> Result<Cost> {
        let Some(memory_mb) = memory_mb.filter(|mb| *mb > 0) else {
            return Ok(Cost::Unknown);
        };
        if !provider.is_known() {
            return Ok(Cost::Unknown);
        }

        let Some(pricing) = self.catalog.pricing_for(provider).await? else {
            debug!(provider = %provider, "cost_model.no_pricing");
            return Ok(Cost::Unknown);
        };

        match price(&pricing, memory_mb, runtime_ms) {
            Some(cost) => Ok(Cost::Known(cost)),
            None => {
                debug!(runtime_ms, provider = %provider, "cost_model.runtime_out_of_range");
                Ok(Cost::Unknown)
            }
        }
    }
}

/// Apply a pricing entry to one invocation.
///
/// Returns `None` when the runtime cannot be rounded to the billing unit
/// without overflowing.
pub fn price(pricing: &PricingEntry, memory_mb: i32, runtime_ms: i64) -> Option<f64> {
    let usage = BilledUsage {
        memory_mb,
        billed_ms: round_to_billing_unit(runtime_ms, pricing.billing_unit_ms)?,
    };
    Some(formula_for(pricing.model).charge(pricing, usage))
}
