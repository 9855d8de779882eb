//! Three-tier running-average update

use std::sync::Arc;

use metasync_domain::{
    Cost, DeploymentRecord, ImplementationRecord, Invocation, LineageHint, Result, TierLineage,
    TierStats, TypeRecord,
};
use tracing::{debug, instrument};

use super::locks::TierLocks;
use super::mean::{effective_loop_value, running_loop_counter, running_mean, running_success_rate};
use crate::sync::ports::AggregateStore;

/// Measurements of one invocation, folded into every tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub rtt_ms: f64,
    /// Measured runtime; `None` keeps the deployment's runtime average.
    pub runtime_ms: Option<f64>,
    /// Computed once per invocation and shared by all tiers.
    pub cost: Cost,
    pub success: bool,
    pub loop_value: i64,
}

impl Observation {
    pub fn new(invocation: &Invocation, cost: Cost) -> Self {
        Self {
            rtt_ms: invocation.rtt_ms as f64,
            runtime_ms: invocation.runtime_ms.map(|ms| ms as f64),
            cost,
            success: invocation.success,
            loop_value: effective_loop_value(invocation.max_loop_counter),
        }
    }
}

/// Fold one observation into the averages shared by all tiers.
///
/// Cost substitution reads this tier's own average.
pub fn fold_stats(stats: TierStats, observation: &Observation) -> TierStats {
    let count = stats.invocations;
    TierStats {
        avg_rtt: running_mean(stats.avg_rtt, count, observation.rtt_ms),
        avg_cost: running_mean(stats.avg_cost, count, observation.cost.or_average(stats.avg_cost)),
        success_rate: running_success_rate(stats.success_rate, count, observation.success),
        invocations: count + 1,
    }
}

/// Fold one observation into a deployment, including runtime and loop
/// counter.
pub fn fold_deployment(deployment: DeploymentRecord, observation: &Observation) -> DeploymentRecord {
    let count = deployment.stats.invocations;
    let runtime = observation.runtime_ms.unwrap_or(deployment.avg_runtime);

    DeploymentRecord {
        avg_runtime: running_mean(deployment.avg_runtime, count, runtime),
        avg_loop_counter: running_loop_counter(
            deployment.avg_loop_counter,
            count,
            observation.loop_value,
        ),
        stats: fold_stats(deployment.stats, observation),
        ..deployment
    }
}

/// Fold one observation into a whole lineage: deployment, then
/// implementation, then type.
pub fn fold_lineage(lineage: TierLineage, observation: &Observation) -> TierLineage {
    let TierLineage { deployment, implementation, function_type } = lineage;

    TierLineage {
        deployment: fold_deployment(deployment, observation),
        implementation: ImplementationRecord {
            stats: fold_stats(implementation.stats, observation),
            ..implementation
        },
        function_type: TypeRecord {
            stats: fold_stats(function_type.stats, observation),
            ..function_type
        },
    }
}

/// Applies resolved invocations to the aggregate store.
pub struct AggregationUpdater {
    store: Arc<dyn AggregateStore>,
    locks: TierLocks,
}

impl AggregationUpdater {
    pub fn new(store: Arc<dyn AggregateStore>) -> Self {
        Self { store, locks: TierLocks::new() }
    }

    /// Fold `invocation` into the lineage of `deployment` and commit all
    /// three tiers together with the applied-entry record.
    ///
    /// The read-modify-write runs under the lock of the lineage's type row.
    #[instrument(skip(self, deployment, invocation), fields(entry_id = invocation.entry_id))]
    pub async fn apply(
        &self,
        deployment: &DeploymentRecord,
        invocation: &Invocation,
        cost: Cost,
    ) -> Result<TierLineage> {
        let hint = lineage_hint(invocation);

        let root_id = self.store.load_lineage(deployment.id, hint.as_ref()).await?.root_id();
        let _guard = self.locks.lock(root_id).await;

        // Re-read under the lock; another entry of this type may have
        // committed since the first read.
        let current = self.store.load_lineage(deployment.id, hint.as_ref()).await?;
        let updated = fold_lineage(current, &Observation::new(invocation, cost));
        self.store.commit_lineage(invocation.entry_id, &updated).await?;

        debug!(
            deployment_id = updated.deployment.id,
            implementation_id = updated.implementation.id,
            type_id = updated.function_type.id,
            invocations = updated.deployment.stats.invocations,
            "aggregation.committed"
        );
        Ok(updated)
    }
}

fn lineage_hint(invocation: &Invocation) -> Option<LineageHint> {
    Some(LineageHint {
        function_name: invocation.function_name.clone()?,
        function_type: invocation.function_type.clone()?,
        provider: invocation.provider,
    })
}
