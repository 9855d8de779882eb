//! Aggregate records for the three metadata tiers
//!
//! Type → Implementation → Deployment. Each tier keeps running averages that
//! are advanced by one observation per consumed log entry.

use serde::{Deserialize, Serialize};

use super::provider::Provider;

/// Running averages common to every tier.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TierStats {
    pub avg_rtt: f64,
    pub avg_cost: f64,
    /// Fraction of successful invocations, in `[0, 1]`.
    pub success_rate: f64,
    pub invocations: i64,
}

/// Function type, keyed by `(name, type_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRecord {
    pub id: i64,
    pub name: String,
    pub type_name: String,
    pub stats: TierStats,
}

/// Function implementation, keyed by `(provider, name, type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationRecord {
    pub id: i64,
    pub name: String,
    pub type_id: i64,
    pub provider: Provider,
    pub stats: TierStats,
}

/// Deployed function instance, keyed by its external id.
///
/// Deployments are provisioned by a registration process; aggregation only
/// ever updates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: i64,
    pub external_id: String,
    /// Unset until the first update links the deployment to its
    /// implementation.
    pub implementation_id: Option<i64>,
    pub memory_size_mb: Option<i32>,
    pub stats: TierStats,
    pub avg_runtime: f64,
    pub avg_loop_counter: i64,
}

/// A deployment together with its implementation and type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierLineage {
    pub deployment: DeploymentRecord,
    pub implementation: ImplementationRecord,
    pub function_type: TypeRecord,
}

impl TierLineage {
    /// Id of the root type row; every row of the lineage descends from it.
    pub fn root_id(&self) -> i64 {
        self.function_type.id
    }
}

/// Names used to create missing implementation and type rows for a
/// deployment that has not been linked yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageHint {
    pub function_name: String,
    pub function_type: String,
    pub provider: Provider,
}

impl LineageHint {
    /// Implementation name, `provider.function.type`.
    pub fn implementation_name(&self) -> String {
        format!("{}.{}.{}", self.provider, self.function_name, self.function_type)
    }
}
