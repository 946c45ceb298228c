//! Structured error types shared across evalgrid crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code, message and context carried by every [`EvalError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable identifier, e.g. `unknown_column` or `task_failed`.
    pub code: String,
    /// What went wrong.
    pub message: String,
    /// Where it went wrong: job, group, task, column, path.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Rendering of the lower level cause, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Payload without context or hint.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Records where the failure happened. A repeated key keeps the last value.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Attaches the lower level cause.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Renders as `message [code] at key=value, key=value: hint`.
impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.message, self.code)?;
        let mut entries = self.context.iter();
        if let Some((key, value)) = entries.next() {
            write!(f, " at {key}={value}")?;
            for (key, value) in entries {
                write!(f, ", {key}={value}")?;
            }
        }
        match &self.hint {
            Some(hint) => write!(f, ": {hint}"),
            None => Ok(()),
        }
    }
}

/// Canonical error type for evaluation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum EvalError {
    /// Invalid layouts, rows or configuration values.
    #[error("configuration error: {0}")]
    Config(ErrorInfo),
    /// Component resolution or instantiation failed.
    #[error("build error: {0}")]
    Build(ErrorInfo),
    /// An evaluation task failed or panicked.
    #[error("task error: {0}")]
    Task(ErrorInfo),
    /// A sink or file could not be opened, written or closed.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// The job was cancelled by a sibling failure or an external interrupt.
    #[error("cancelled: {0}")]
    Cancelled(ErrorInfo),
    /// Fatal wrapper surfaced by a run, carrying the originating cause and any
    /// failures observed while releasing resources afterwards.
    #[error("evaluation failed: {cause}")]
    Evaluation {
        /// The error that aborted the run.
        #[source]
        cause: Box<EvalError>,
        /// Secondary errors raised during teardown.
        #[serde(default)]
        suppressed: Vec<EvalError>,
    },
}

/// Convenience alias used throughout the workspace.
pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    /// Wraps an error as the fatal cause of a run. Already wrapped errors are
    /// returned unchanged so causes never nest twice.
    pub fn fatal(cause: EvalError) -> Self {
        match cause {
            wrapped @ EvalError::Evaluation { .. } => wrapped,
            other => EvalError::Evaluation {
                cause: Box::new(other),
                suppressed: Vec::new(),
            },
        }
    }

    /// Attaches a teardown failure without replacing the primary cause.
    pub fn suppress(self, secondary: EvalError) -> Self {
        match self {
            EvalError::Evaluation {
                cause,
                mut suppressed,
            } => {
                suppressed.push(secondary);
                EvalError::Evaluation { cause, suppressed }
            }
            other => EvalError::Evaluation {
                cause: Box::new(other),
                suppressed: vec![secondary],
            },
        }
    }

    /// Returns the innermost error that is not an [`EvalError::Evaluation`] wrapper.
    pub fn root_cause(&self) -> &EvalError {
        match self {
            EvalError::Evaluation { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Secondary errors attached while releasing resources.
    pub fn suppressed(&self) -> &[EvalError] {
        match self {
            EvalError::Evaluation { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Returns true when the root cause is a cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.root_cause(), EvalError::Cancelled(_))
    }

    /// Adds a context entry to the root cause payload.
    pub fn with_context(self, key: impl Into<String>, value: impl ToString) -> Self {
        match self {
            EvalError::Config(info) => EvalError::Config(info.with_context(key, value)),
            EvalError::Build(info) => EvalError::Build(info.with_context(key, value)),
            EvalError::Task(info) => EvalError::Task(info.with_context(key, value)),
            EvalError::Io(info) => EvalError::Io(info.with_context(key, value)),
            EvalError::Cancelled(info) => EvalError::Cancelled(info.with_context(key, value)),
            EvalError::Evaluation { cause, suppressed } => EvalError::Evaluation {
                cause: Box::new(cause.with_context(key, value)),
                suppressed,
            },
        }
    }

    /// Returns a reference to the payload describing the root cause.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            EvalError::Config(info)
            | EvalError::Build(info)
            | EvalError::Task(info)
            | EvalError::Io(info)
            | EvalError::Cancelled(info) => info,
            EvalError::Evaluation { cause, .. } => cause.info(),
        }
    }
}

/// Builds an [`EvalError::Io`] from any displayable lower level error.
pub fn io_error(code: &str, err: impl ToString) -> EvalError {
    EvalError::Io(ErrorInfo::new(code, "i/o failure").with_hint(err.to_string()))
}
