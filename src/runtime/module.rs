use std::rc::Rc;

use tracing::debug;

use crate::lexer::tokenize;
use crate::parser::{parse, parse_expression};
use crate::utils::errors::Diagnostic;

use super::env::Env;
use super::error::{ExecutionLimits, MaterializationError, RuntimeError};
use super::interpreter::Interpreter;
use super::value::Value;

/// A materialized source text: its top-level bindings after executing the body.
///
/// Closures defined by the module keep its globals alive, so dropping the
/// module clears them to release the cycle. Hold the module for as long as its
/// functions are being called.
pub struct Module {
    source_id: String,
    globals: Rc<Env>,
    limits: ExecutionLimits,
}

impl Module {
    /// Parses `source` and executes its top level in a fresh namespace.
    pub fn load(
        source_id: &str,
        source: &str,
        limits: ExecutionLimits,
    ) -> Result<Self, MaterializationError> {
        let tokens = tokenize(source).map_err(|errors| {
            syntax_error(
                errors.iter().map(|err| err.to_diagnostic(source_id)).collect(),
                source,
            )
        })?;
        let program = parse(&tokens).map_err(|errors| {
            syntax_error(
                errors.iter().map(|err| err.to_diagnostic(source_id)).collect(),
                source,
            )
        })?;

        let globals = Env::global();
        globals.set("__name__", Value::str(source_id));
        let mut interpreter = Interpreter::new(limits);
        interpreter
            .exec_block(&crate::ast::nodes::Block::new(program.statements), &globals)
            .map_err(MaterializationError::Execution)?;

        let module = Self {
            source_id: source_id.to_string(),
            globals,
            limits,
        };
        debug!(source_id, symbols = ?module.names(), "materialized module");
        Ok(module)
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.get_local(name)
    }

    /// Names bound at the top level, sorted.
    pub fn names(&self) -> Vec<String> {
        self.globals.names()
    }

    /// The callable bound to `name`.
    pub fn function(&self, name: &str) -> Result<Value, MaterializationError> {
        let value = self.get(name).ok_or_else(|| MaterializationError::MissingSymbol {
            name: name.to_string(),
        })?;
        if value.is_callable() {
            Ok(value)
        } else {
            Err(MaterializationError::NotCallable {
                name: name.to_string(),
                kind: value.type_name().to_string(),
            })
        }
    }

    /// Calls the top-level function `name`.
    pub fn call(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        let callee = self
            .get(name)
            .ok_or_else(|| RuntimeError::Name(name.to_string()))?;
        self.call_value(&callee, args, kwargs)
    }

    pub fn call_value(
        &self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        Interpreter::new(self.limits).call_value(callee, args, kwargs)
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        self.globals.clear();
    }
}

fn syntax_error(diagnostics: Vec<Diagnostic>, source: &str) -> MaterializationError {
    MaterializationError::Syntax {
        diagnostics,
        text: source.to_string(),
    }
}

/// Evaluates a standalone expression such as a command-line argument.
pub fn eval_expression(
    source_id: &str,
    text: &str,
    limits: ExecutionLimits,
) -> Result<Value, MaterializationError> {
    let tokens = tokenize(text).map_err(|errors| {
        syntax_error(
            errors.iter().map(|err| err.to_diagnostic(source_id)).collect(),
            text,
        )
    })?;
    let expr = parse_expression(&tokens).map_err(|errors| {
        syntax_error(
            errors.iter().map(|err| err.to_diagnostic(source_id)).collect(),
            text,
        )
    })?;
    Interpreter::new(limits)
        .eval(&expr, &Env::global())
        .map_err(MaterializationError::Execution)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_calls_functions() -> Result<(), Box<dyn std::error::Error>> {
        let module = Module::load(
            "<test>",
            "def double(x):\n    return x * 2\n\nLIMIT = 3\n",
            ExecutionLimits::default(),
        )?;
        assert_eq!(module.call("double", vec![Value::Int(21)], vec![])?, Value::Int(42));
        assert!(matches!(
            module.function("LIMIT"),
            Err(MaterializationError::NotCallable { .. })
        ));
        assert!(matches!(
            module.function("missing"),
            Err(MaterializationError::MissingSymbol { .. })
        ));
        Ok(())
    }

    #[test]
    fn syntax_errors_carry_diagnostics() {
        let result = Module::load("<test>", "def broken(:\n    pass\n", ExecutionLimits::default());
        match result {
            Err(MaterializationError::Syntax { diagnostics, .. }) => {
                assert!(!diagnostics.is_empty());
            }
            _ => panic!("expected a syntax error"),
        }
    }

    #[test]
    fn expressions_evaluate_to_values() -> Result<(), MaterializationError> {
        let value = eval_expression("<arg>", "[1, 2] + [3]", ExecutionLimits::default())?;
        assert_eq!(value.repr(), "[1, 2, 3]");
        Ok(())
    }
}
