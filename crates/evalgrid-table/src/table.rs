use std::sync::Arc;

use evalgrid_core::{ErrorInfo, EvalError, EvalResult, ResultRow};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::layout::TableLayout;
use crate::sink::TableSink;

static NULL: Value = Value::Null;

struct TableState {
    rows: Vec<ResultRow>,
    sinks: Vec<Box<dyn TableSink>>,
    closed: bool,
}

/// Shared accumulator for result rows, with fan-out to attached sinks.
///
/// Rows arrive from concurrently running jobs, so every write happens under a
/// single lock: at most one row is in flight at a time, and a row counts as
/// written only once every sink accepted it.
pub struct ResultTable {
    name: String,
    layout: Arc<TableLayout>,
    state: Mutex<TableState>,
}

impl ResultTable {
    /// Opens an empty table for the given layout.
    pub fn open(name: impl Into<String>, layout: TableLayout) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            layout: Arc::new(layout),
            state: Mutex::new(TableState {
                rows: Vec::new(),
                sinks: Vec::new(),
                closed: false,
            }),
        })
    }

    /// Table name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column layout shared by every row.
    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Attaches a sink that will receive every subsequent row.
    pub fn attach(&self, sink: Box<dyn TableSink>) -> EvalResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        debug!(table = %self.name, sink = %sink.describe(), "attached sink");
        state.sinks.push(sink);
        Ok(())
    }

    /// Validates a row against the layout, fills missing columns with null,
    /// forwards it to every sink and appends it to the buffer.
    pub fn write(&self, row: ResultRow) -> EvalResult<()> {
        let row = self.normalize(row)?;
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        for sink in state.sinks.iter_mut() {
            sink.write_row(&self.layout, &row).map_err(|err| {
                warn!(table = %self.name, sink = %sink.describe(), error = %err, "sink rejected row");
                err
            })?;
        }
        state.rows.push(row);
        Ok(())
    }

    /// Closes every sink in reverse attach order. Only the first call does
    /// any work; the first sink failure is returned and later ones logged.
    pub fn close(&self) -> EvalResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        let mut first: Option<EvalError> = None;
        while let Some(mut sink) = state.sinks.pop() {
            if let Err(err) = sink.close() {
                if first.is_none() {
                    first = Some(err);
                } else {
                    warn!(table = %self.name, sink = %sink.describe(), error = %err, "additional sink close failure");
                }
            }
        }
        debug!(table = %self.name, rows = state.rows.len(), "closed table");
        first.map_or(Ok(()), Err)
    }

    /// Returns true once [`ResultTable::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of rows written so far.
    pub fn len(&self) -> usize {
        self.state.lock().rows.len()
    }

    /// Returns true when no row was written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the accumulated rows into an immutable [`Table`].
    pub fn snapshot(&self) -> Table {
        Table {
            layout: Arc::clone(&self.layout),
            rows: self.state.lock().rows.clone(),
        }
    }

    fn normalize(&self, row: ResultRow) -> EvalResult<ResultRow> {
        if let Some(unknown) = row.columns().find(|column| !self.layout.contains(column)) {
            return Err(EvalError::Config(
                ErrorInfo::new("unknown_column", "row has a column outside the table layout")
                    .with_context("table", self.name.clone())
                    .with_context("column", unknown),
            ));
        }
        Ok(self
            .layout
            .columns()
            .map(|column| {
                let value = row.get(column).cloned().unwrap_or(Value::Null);
                (column.to_string(), value)
            })
            .collect())
    }

    fn closed_error(&self) -> EvalError {
        EvalError::Io(
            ErrorInfo::new("table_closed", "result table already closed")
                .with_context("table", self.name.clone()),
        )
    }
}

/// Immutable result set returned by a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    layout: Arc<TableLayout>,
    rows: Vec<ResultRow>,
}

impl Table {
    /// Column layout.
    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Column names in order.
    pub fn columns(&self) -> Vec<&str> {
        self.layout.columns().collect()
    }

    /// Rows in write order.
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true for a table without rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        if !self.layout.contains(name) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| row.get(name).unwrap_or(&NULL))
                .collect(),
        )
    }

    /// Rows whose column equals the given value.
    pub fn rows_where<'a>(
        &'a self,
        column: &'a str,
        value: &'a Value,
    ) -> impl Iterator<Item = &'a ResultRow> + 'a {
        self.rows
            .iter()
            .filter(move |row| row.get(column) == Some(value))
    }
}
