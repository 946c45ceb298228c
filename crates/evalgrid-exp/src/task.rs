use evalgrid_cache::Component;
use evalgrid_core::{Attributes, DataCondition, EvalResult};
use serde_json::Value;

/// Values produced by one task run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    /// Aggregate measurements merged into the job's result row.
    pub measurements: Attributes,
    /// Optional detail rows (for instance one per test user) routed to the
    /// secondary output when one is configured.
    pub details: Vec<Attributes>,
}

impl TaskOutput {
    /// Creates an empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an aggregate measurement.
    pub fn with_measurement(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.measurements.insert(column.into(), value.into());
        self
    }

    /// Adds a detail row.
    pub fn with_detail(mut self, row: Attributes) -> Self {
        self.details.push(row);
        self
    }
}

/// Evaluation step run against a built model for one data condition.
///
/// Tasks declare their columns up front because the output layout is fixed
/// before the first row is written.
pub trait EvalTask: Send + Sync {
    /// Task name used in logs and error context.
    fn name(&self) -> &str;

    /// Measurement columns this task adds to the aggregate table.
    fn measure_columns(&self) -> Vec<String>;

    /// Columns of the detail rows this task emits.
    fn detail_columns(&self) -> Vec<String> {
        Vec::new()
    }

    /// Runs the task. Panics are caught by the job and reported as task errors.
    fn run(&self, model: &Component, condition: &DataCondition) -> EvalResult<TaskOutput>;
}
