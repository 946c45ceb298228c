#![deny(missing_docs)]
#![doc = "Result layouts, the shared result table, tabular sinks and scoped teardown."]

/// Column layouts derived from experiment inputs.
pub mod layout;
/// Scoped release of run resources.
pub mod scope;
/// Tabular sinks, including the CSV writer.
pub mod sink;
/// The shared result accumulator and its snapshots.
pub mod table;

pub use layout::{OutputLayout, TableLayout, BUILD_TIME_COLUMN, TEST_TIME_COLUMN};
pub use scope::{Closeable, ResourceScope};
pub use sink::{render_cell, Compression, CsvSink, TableSink};
pub use table::{ResultTable, Table};
