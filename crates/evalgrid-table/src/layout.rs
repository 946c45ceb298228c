use evalgrid_core::{AlgorithmVariant, DataCondition};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Column holding the wall-clock model build time in seconds.
pub const BUILD_TIME_COLUMN: &str = "BuildTime";
/// Column holding the accumulated wall-clock task time in seconds.
pub const TEST_TIME_COLUMN: &str = "TestTime";

/// Ordered, duplicate-free list of column names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableLayout {
    columns: IndexSet<String>,
}

impl TableLayout {
    /// Builds a layout, keeping the first occurrence of each column name.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Position of a column, if present.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.get_index_of(column)
    }

    /// Returns true when the layout has the column.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true for a layout without columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Condition and algorithm attribute columns of an experiment, computed once
/// before any row is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLayout {
    condition_columns: IndexSet<String>,
    algorithm_columns: IndexSet<String>,
}

impl OutputLayout {
    /// Derives the columns from every condition and algorithm attribute key,
    /// in first-seen order. A key used by both sides is reported once, as a
    /// condition column.
    pub fn build(conditions: &[DataCondition], algorithms: &[AlgorithmVariant]) -> Self {
        if conditions.is_empty() || algorithms.is_empty() {
            warn!(
                conditions = conditions.len(),
                algorithms = algorithms.len(),
                "experiment has no jobs to run"
            );
        }
        let condition_columns: IndexSet<String> = conditions
            .iter()
            .flat_map(|condition| condition.attributes().keys().cloned())
            .collect();
        let algorithm_columns = algorithms
            .iter()
            .flat_map(|algorithm| algorithm.attributes().keys().cloned())
            .filter(|key| !condition_columns.contains(key))
            .collect();
        Self {
            condition_columns,
            algorithm_columns,
        }
    }

    /// Data condition attribute columns.
    pub fn condition_columns(&self) -> impl Iterator<Item = &str> {
        self.condition_columns.iter().map(String::as_str)
    }

    /// Algorithm attribute columns.
    pub fn algorithm_columns(&self) -> impl Iterator<Item = &str> {
        self.algorithm_columns.iter().map(String::as_str)
    }

    /// Condition columns followed by algorithm columns.
    pub fn attribute_columns(&self) -> impl Iterator<Item = &str> {
        self.condition_columns().chain(self.algorithm_columns())
    }

    /// Layout of the aggregate table: attribute columns, the two timing
    /// columns, then the measurement columns declared by tasks.
    pub fn table_layout<S: AsRef<str>>(&self, measurements: &[S]) -> TableLayout {
        TableLayout::new(
            self.attribute_columns()
                .chain([BUILD_TIME_COLUMN, TEST_TIME_COLUMN])
                .chain(measurements.iter().map(|column| column.as_ref())),
        )
    }

    /// Layout of the secondary per-task detail table.
    pub fn detail_layout<S: AsRef<str>>(&self, columns: &[S]) -> TableLayout {
        TableLayout::new(
            self.attribute_columns()
                .chain(columns.iter().map(|column| column.as_ref())),
        )
    }
}
