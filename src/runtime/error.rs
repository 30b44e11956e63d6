use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::errors::{render_diagnostics, Diagnostic};

/// An exception raised while evaluating generated code. Rendered the way the
/// language prints an uncaught exception's last line.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("NameError: name '{0}' is not defined")]
    Name(String),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ValueError: {0}")]
    Value(String),
    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),
    #[error("IndexError: {0}")]
    Index(String),
    #[error("KeyError: {0}")]
    Key(String),
    #[error("AttributeError: {0}")]
    Attribute(String),
    #[error("OverflowError: {0}")]
    Overflow(String),
    #[error("ImportError: {0}")]
    Import(String),
    #[error("RecursionError: maximum recursion depth of {0} exceeded")]
    RecursionLimit(usize),
    #[error("execution exceeded the step budget of {0}")]
    StepLimit(u64),
    #[error("{}", render_raised(.kind, .message))]
    Raised { kind: String, message: String },
}

fn render_raised(kind: &str, message: &str) -> String {
    if message.is_empty() {
        kind.to_string()
    } else {
        format!("{kind}: {message}")
    }
}

impl RuntimeError {
    /// The exception class name.
    pub fn kind(&self) -> &str {
        match self {
            RuntimeError::Name(_) => "NameError",
            RuntimeError::Type(_) => "TypeError",
            RuntimeError::Value(_) => "ValueError",
            RuntimeError::ZeroDivision(_) => "ZeroDivisionError",
            RuntimeError::Index(_) => "IndexError",
            RuntimeError::Key(_) => "KeyError",
            RuntimeError::Attribute(_) => "AttributeError",
            RuntimeError::Overflow(_) => "OverflowError",
            RuntimeError::Import(_) => "ImportError",
            RuntimeError::RecursionLimit(_) => "RecursionError",
            RuntimeError::StepLimit(_) => "StepLimitError",
            RuntimeError::Raised { kind, .. } => kind,
        }
    }

    pub(crate) fn overflow() -> Self {
        RuntimeError::Overflow("integer result too large".to_string())
    }
}

/// Text that could not be turned into a callable implementation.
#[derive(Debug, Clone, Error)]
pub enum MaterializationError {
    #[error("source does not parse:\n{}", render_diagnostics(.diagnostics))]
    Syntax {
        diagnostics: Vec<Diagnostic>,
        text: String,
    },
    #[error("executing module body failed: {0}")]
    Execution(RuntimeError),
    #[error("source does not define `{name}`")]
    MissingSymbol { name: String },
    #[error("`{name}` is bound to a {kind}, not a function")]
    NotCallable { name: String, kind: String },
}

/// Bounds applied to every evaluation so runaway generated code terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    pub max_call_depth: usize,
    pub max_steps: u64,
    /// Longest string, list or tuple a single operation may build.
    pub max_sequence_len: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 200,
            max_steps: 10_000_000,
            max_sequence_len: 10_000_000,
        }
    }
}
