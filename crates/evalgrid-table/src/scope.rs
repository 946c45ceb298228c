use std::sync::Arc;

use evalgrid_core::{EvalError, EvalResult};
use tracing::warn;

use crate::table::ResultTable;

/// A resource that must be released exactly once at the end of a run.
pub trait Closeable: Send + Sync {
    /// Releases the resource. Must tolerate repeated calls.
    fn close(&self) -> EvalResult<()>;

    /// Label used when reporting close failures.
    fn label(&self) -> String;
}

impl Closeable for ResultTable {
    fn close(&self) -> EvalResult<()> {
        ResultTable::close(self)
    }

    fn label(&self) -> String {
        format!("table:{}", self.name())
    }
}

/// Registry of opened resources, released in reverse registration order.
///
/// Resources are pushed as soon as they are opened, so a failure halfway
/// through opening still releases everything opened before it.
#[derive(Default)]
pub struct ResourceScope {
    resources: Vec<Arc<dyn Closeable>>,
    closed: bool,
}

impl ResourceScope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an opened resource and hands it back.
    pub fn register<T: Closeable + 'static>(&mut self, resource: Arc<T>) -> Arc<T> {
        self.resources.push(resource.clone());
        resource
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Releases every resource in reverse order and returns all failures.
    /// Later calls do nothing.
    pub fn close_all(&mut self) -> Vec<EvalError> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        let mut failures = Vec::new();
        while let Some(resource) = self.resources.pop() {
            if let Err(err) = resource.close() {
                warn!(resource = %resource.label(), error = %err, "failed to release resource");
                failures.push(err);
            }
        }
        failures
    }

    /// Closes the scope and merges teardown failures into the outcome of the
    /// work it guarded.
    ///
    /// On success the first teardown failure becomes the result, with later
    /// ones attached as suppressed. On failure the primary error is kept and
    /// every teardown failure is attached to it.
    pub fn finish<T>(mut self, outcome: EvalResult<T>) -> EvalResult<T> {
        let mut failures = self.close_all().into_iter();
        match outcome {
            Ok(value) => match failures.next() {
                None => Ok(value),
                Some(first) => Err(failures.fold(EvalError::fatal(first), EvalError::suppress)),
            },
            Err(primary) => Err(failures.fold(EvalError::fatal(primary), EvalError::suppress)),
        }
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        // Reached only when `finish` was never called, e.g. while unwinding.
        self.close_all();
    }
}
