//! Execution log entries
//!
//! A [`LogEntry`] is one document of the execution log as written by the
//! workflow runtime. Every measurement is optional at this level because the
//! producer may omit fields; [`LogEntry::validate`] turns an entry into an
//! [`Invocation`] carrying only the fields aggregation can rely on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::provider::Provider;
use crate::constants::{EXEC_ENTRY_TYPE, NO_LOOP, OUTPUT_RUNTIME_KEY};
use crate::impl_domain_status_conversions;

/// Consumption state of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Not yet folded into the tier aggregates.
    Pending,
    /// Folded into the aggregates exactly once.
    Done,
    /// Consumed without touching any aggregate.
    Skipped,
}

impl_domain_status_conversions!(EntryStatus {
    Pending => "pending",
    Done => "done",
    Skipped => "skipped",
});

/// Lifecycle event recorded by the workflow runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogEvent {
    WorkflowStart,
    WorkflowEnd,
    WorkflowFailed,
    FunctionStart,
    FunctionEnd,
    FunctionFailed,
    FunctionCanceled,
    ParallelForEnd,
}

impl_domain_status_conversions!(LogEvent {
    WorkflowStart => "workflow_start",
    WorkflowEnd => "workflow_end",
    WorkflowFailed => "workflow_failed",
    FunctionStart => "function_start",
    FunctionEnd => "function_end",
    FunctionFailed => "function_failed",
    FunctionCanceled => "function_canceled",
    ParallelForEnd => "parallel_for_end",
});

impl LogEvent {
    /// Function-level events describe a single invocation and are eligible
    /// for aggregation; workflow-level events are not.
    pub fn is_function_event(self) -> bool {
        matches!(
            self,
            Self::FunctionStart | Self::FunctionEnd | Self::FunctionFailed | Self::FunctionCanceled
        )
    }
}

/// Which entries of a workflow an end-time query considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopScope {
    Any,
    /// Entries recorded outside any parallel loop.
    OutsideLoop,
    /// Entries recorded inside a parallel loop.
    InsideLoop,
}

impl LoopScope {
    /// Whether an entry with `loop_counter` falls in this scope. A missing
    /// counter counts as outside any loop.
    pub fn matches(self, loop_counter: Option<i32>) -> bool {
        let inside = loop_counter.is_some_and(|counter| counter != NO_LOOP);
        match self {
            Self::Any => true,
            Self::OutsideLoop => !inside,
            Self::InsideLoop => inside,
        }
    }
}

/// One execution log document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub workflow_id: Option<i64>,
    pub event: Option<LogEvent>,
    pub entry_type: String,
    /// Deployment identifier (ARN or URL).
    pub external_id: Option<String>,
    pub function_name: Option<String>,
    pub function_type: Option<String>,
    pub provider: Option<Provider>,
    /// JSON object returned by the function.
    pub output: Option<String>,
    pub rtt_ms: Option<i64>,
    pub success: Option<bool>,
    pub memory_size_mb: Option<i32>,
    pub loop_counter: Option<i32>,
    pub max_loop_counter: Option<i32>,
    pub precomputed_cost: Option<f64>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub status: EntryStatus,
}

/// Reason a log entry cannot be aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryDefect {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("round-trip time must not be negative (got {0} ms)")]
    NegativeRtt(i64),

    #[error("entry type `{0}` is not an execution")]
    NotExecution(String),
}

/// Validated view of a log entry, ready for cost and aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub entry_id: i64,
    pub external_id: String,
    pub function_name: Option<String>,
    pub function_type: Option<String>,
    pub provider: Provider,
    pub rtt_ms: i64,
    pub success: bool,
    /// Runtime reported in the payload, if any.
    pub runtime_ms: Option<i64>,
    pub memory_size_mb: Option<i32>,
    pub max_loop_counter: Option<i32>,
    pub precomputed_cost: Option<f64>,
}

impl Invocation {
    /// Runtime to bill: the measured runtime when present, else the RTT.
    pub fn billable_runtime_ms(&self) -> i64 {
        self.runtime_ms.unwrap_or(self.rtt_ms)
    }
}

impl LogEntry {
    /// Create a pending execution entry with every measurement unset.
    pub fn new_exec(id: i64, external_id: impl Into<String>) -> Self {
        Self {
            id,
            workflow_id: None,
            event: Some(LogEvent::FunctionEnd),
            entry_type: EXEC_ENTRY_TYPE.to_string(),
            external_id: Some(external_id.into()),
            function_name: None,
            function_type: None,
            provider: None,
            output: None,
            rtt_ms: None,
            success: None,
            memory_size_mb: None,
            loop_counter: None,
            max_loop_counter: None,
            precomputed_cost: None,
            start_time: None,
            end_time: None,
            status: EntryStatus::Pending,
        }
    }

    /// Runtime in milliseconds taken from the `runtime` key of the output
    /// payload. Returns `None` when the payload is absent, is not a JSON
    /// object, or carries no non-negative number under that key.
    pub fn runtime_ms(&self) -> Option<i64> {
        let output = self.output.as_deref()?;
        let payload: serde_json::Value = serde_json::from_str(output).ok()?;
        let value = payload.as_object()?.get(OUTPUT_RUNTIME_KEY)?;

        let runtime = match value.as_i64() {
            Some(ms) => ms,
            // Fractional milliseconds round up.
            None => value.as_f64().map(|ms| ms.ceil() as i64)?,
        };
        (runtime >= 0).then_some(runtime)
    }

    /// Provider from the entry, falling back to detection from the external
    /// id when the producer did not record one.
    pub fn effective_provider(&self) -> Provider {
        match self.provider {
            Some(provider) if provider.is_known() => provider,
            _ => self.external_id.as_deref().map_or(Provider::Unknown, Provider::detect),
        }
    }

    /// Check the fields aggregation depends on.
    ///
    /// # Errors
    /// Returns the first [`EntryDefect`] found.
    pub fn validate(&self) -> Result<Invocation, EntryDefect> {
        if !self.entry_type.eq_ignore_ascii_case(EXEC_ENTRY_TYPE) {
            return Err(EntryDefect::NotExecution(self.entry_type.clone()));
        }

        let external_id = self
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(EntryDefect::MissingField("external_id"))?;
        let rtt_ms = self.rtt_ms.ok_or(EntryDefect::MissingField("rtt_ms"))?;
        if rtt_ms < 0 {
            return Err(EntryDefect::NegativeRtt(rtt_ms));
        }
        let success = self.success.ok_or(EntryDefect::MissingField("success"))?;

        Ok(Invocation {
            entry_id: self.id,
            external_id: external_id.to_string(),
            function_name: self.function_name.clone(),
            function_type: self.function_type.clone(),
            provider: self.effective_provider(),
            rtt_ms,
            success,
            runtime_ms: self.runtime_ms(),
            memory_size_mb: self.memory_size_mb.filter(|mb| *mb > 0),
            max_loop_counter: self.max_loop_counter,
            precomputed_cost: self.precomputed_cost.filter(|cost| *cost >= 0.0),
        })
    }
}
