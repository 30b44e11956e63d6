//! Materialization: evaluating generated source text and dispatching calls into it.

pub mod builtins;
pub mod env;
pub mod error;
pub mod format;
pub mod interpreter;
mod methods;
pub mod module;
pub mod modules;
mod ops;
pub mod value;

pub use error::{ExecutionLimits, MaterializationError, RuntimeError};
pub use module::{eval_expression, Module};
pub use value::Value;
