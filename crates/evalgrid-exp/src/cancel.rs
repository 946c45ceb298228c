use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use evalgrid_core::{ErrorInfo, EvalError, EvalResult};

/// Cooperative cancellation flag shared by the jobs of one isolation group.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`EvalError::Cancelled`] when cancellation was requested.
    pub fn check(&self, job: &str) -> EvalResult<()> {
        if self.is_cancelled() {
            return Err(EvalError::Cancelled(
                ErrorInfo::new("job_cancelled", "job cancelled before completion")
                    .with_context("job", job),
            ));
        }
        Ok(())
    }
}

/// External stop request for a whole run, e.g. raised from a signal handler.
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Creates an unraised handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the running experiment to stop.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`Interrupt::raise`] was called.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn error(&self) -> EvalError {
        EvalError::Cancelled(ErrorInfo::new("interrupted", "run interrupted"))
    }
}
