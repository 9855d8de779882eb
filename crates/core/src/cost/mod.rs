//! Invocation cost computation

pub mod formula;
pub mod model;

pub use formula::{allocated_ghz, formula_for, round_to_billing_unit, BilledUsage, CostFormula};
pub use model::{price, CostModel};
