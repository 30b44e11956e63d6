use std::rc::Rc;

use tracing::trace;

use crate::ast::nodes::{
    Arg, BinaryOp, Block, Expr, FStringPart, Function, Literal, Statement, Subscript, Target,
};

use super::builtins;
use super::env::Env;
use super::error::{ExecutionLimits, RuntimeError};
use super::format::format_value;
use super::methods;
use super::modules;
use super::ops;
use super::value::{Closure, Value};

type EvalResult<T = Value> = Result<T, RuntimeError>;

/// Headroom that must remain on the native stack before evaluating deeper.
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each extra stack segment allocated once the red zone is reached.
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

/// How a statement finished.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Tree-walking evaluator with a call depth bound and a step budget.
pub struct Interpreter {
    limits: ExecutionLimits,
    steps: u64,
    depth: usize,
}

impl Interpreter {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            steps: 0,
            depth: 0,
        }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn max_sequence_len(&self) -> usize {
        self.limits.max_sequence_len
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(RuntimeError::StepLimit(self.limits.max_steps));
        }
        Ok(())
    }

    pub fn exec_block(&mut self, block: &Block, env: &Rc<Env>) -> EvalResult<Flow> {
        for statement in &block.statements {
            match self.exec(statement, env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, statement: &Statement, env: &Rc<Env>) -> EvalResult<Flow> {
        self.tick()?;
        match statement {
            Statement::Function(function) => {
                self.define(function, env)?;
            }
            Statement::Expr(expr) => {
                self.eval(expr, env)?;
            }
            Statement::Assignment { target, expr } => {
                let value = self.eval(expr, env)?;
                self.assign(target, value, env)?;
            }
            Statement::AugAssignment { target, op, expr } => {
                self.aug_assign(target, *op, expr, env)?;
            }
            Statement::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Statement::If {
                cond,
                then_block,
                elif_blocks,
                else_block,
            } => {
                if self.eval(cond, env)?.truthy() {
                    return self.exec_block(then_block, env);
                }
                for (cond, block) in elif_blocks {
                    if self.eval(cond, env)?.truthy() {
                        return self.exec_block(block, env);
                    }
                }
                if let Some(block) = else_block {
                    return self.exec_block(block, env);
                }
            }
            Statement::While { cond, body } => loop {
                self.tick()?;
                if !self.eval(cond, env)?.truthy() {
                    break;
                }
                match self.exec_block(body, env)? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
            },
            Statement::For {
                target,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable, env)?;
                for item in iterable.iter()? {
                    self.tick()?;
                    self.assign(target, item, env)?;
                    match self.exec_block(body, env)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Statement::Import { module, alias } => {
                let imported = modules::import(module)?;
                env.set(alias.as_deref().unwrap_or(module), Value::Module(imported));
            }
            Statement::FromImport { module, names } => {
                let imported = modules::import(module)?;
                for (name, alias) in names {
                    let value = imported.attribute(name).ok_or_else(|| {
                        RuntimeError::Import(format!(
                            "cannot import name '{name}' from '{module}'"
                        ))
                    })?;
                    env.set(alias.as_deref().unwrap_or(name), value);
                }
            }
            Statement::Raise(expr) => return Err(self.raise(expr.as_ref(), env)?),
            Statement::Assert { cond, message } => {
                if !self.eval(cond, env)?.truthy() {
                    let message = match message {
                        Some(message) => self.eval(message, env)?.to_string(),
                        None => String::new(),
                    };
                    return Err(RuntimeError::Raised {
                        kind: "AssertionError".to_string(),
                        message,
                    });
                }
            }
            Statement::Break => return Ok(Flow::Break),
            Statement::Continue => return Ok(Flow::Continue),
            Statement::Pass => {}
        }
        Ok(Flow::Normal)
    }

    fn define(&mut self, function: &Function, env: &Rc<Env>) -> EvalResult<()> {
        let defaults = function
            .params
            .iter()
            .map(|param| {
                param
                    .default
                    .as_ref()
                    .map(|default| self.eval(default, env))
                    .transpose()
            })
            .collect::<EvalResult<Vec<_>>>()?;
        trace!(name = %function.name, "defining function");
        let closure = Closure {
            name: function.name.clone(),
            decl: Rc::new(function.clone()),
            defaults,
            env: Rc::clone(env),
        };
        env.set(function.name.clone(), Value::Function(Rc::new(closure)));
        Ok(())
    }

    /// Builds the error a `raise` statement produces.
    fn raise(&mut self, expr: Option<&Expr>, env: &Rc<Env>) -> EvalResult<RuntimeError> {
        let Some(expr) = expr else {
            return Ok(RuntimeError::Raised {
                kind: "RuntimeError".to_string(),
                message: "No active exception to reraise".to_string(),
            });
        };
        Ok(match self.eval(expr, env)? {
            Value::Exception(exception) => RuntimeError::Raised {
                kind: exception.kind.clone(),
                message: exception.message.clone(),
            },
            Value::Builtin(class) if class.is_exception_class() => RuntimeError::Raised {
                kind: class.name().to_string(),
                message: String::new(),
            },
            _ => RuntimeError::Type("exceptions must derive from BaseException".to_string()),
        })
    }

    fn assign(&mut self, target: &Target, value: Value, env: &Rc<Env>) -> EvalResult<()> {
        match target {
            Target::Name(name) => {
                env.set(name.clone(), value);
                Ok(())
            }
            Target::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                ops::set_item(&object, index, value)
            }
            Target::Tuple(targets) => {
                let items = value.to_vec().map_err(|_| {
                    RuntimeError::Type(format!(
                        "cannot unpack non-iterable {} object",
                        value.type_name()
                    ))
                })?;
                if items.len() > targets.len() {
                    return Err(RuntimeError::Value(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                if items.len() < targets.len() {
                    return Err(RuntimeError::Value(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, env)?;
                }
                Ok(())
            }
        }
    }

    fn aug_assign(
        &mut self,
        target: &Target,
        op: BinaryOp,
        expr: &Expr,
        env: &Rc<Env>,
    ) -> EvalResult<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name, env)?;
                let operand = self.eval(expr, env)?;
                let updated = ops::augmented(op, current, &operand, self.limits.max_sequence_len)?;
                env.set(name.clone(), updated);
                Ok(())
            }
            Target::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                let current = ops::get_item(&object, &index)?;
                let operand = self.eval(expr, env)?;
                let updated = ops::augmented(op, current, &operand, self.limits.max_sequence_len)?;
                ops::set_item(&object, index, updated)
            }
            Target::Tuple(_) => Err(RuntimeError::Type(
                "illegal expression for augmented assignment".to_string(),
            )),
        }
    }

    fn lookup(&self, name: &str, env: &Rc<Env>) -> EvalResult {
        env.get(name)
            .or_else(|| builtins::lookup(name))
            .ok_or_else(|| RuntimeError::Name(name.to_string()))
    }

    /// Evaluates `expr`, moving to a fresh stack segment when the current one
    /// runs low so deep recursion in generated code hits `max_call_depth`
    /// instead of overflowing the host thread.
    pub fn eval(&mut self, expr: &Expr, env: &Rc<Env>) -> EvalResult {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.eval_expr(expr, env))
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Rc<Env>) -> EvalResult {
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::Identifier(name) => self.lookup(name, env),
            Expr::Unary { op, expr } => {
                let operand = self.eval(expr, env)?;
                ops::unary(*op, &operand)
            }
            Expr::Binary {
                left,
                op: BinaryOp::And,
                right,
            } => {
                let left = self.eval(left, env)?;
                if left.truthy() {
                    self.eval(right, env)
                } else {
                    Ok(left)
                }
            }
            Expr::Binary {
                left,
                op: BinaryOp::Or,
                right,
            } => {
                let left = self.eval(left, env)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            Expr::Binary { left, op, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                ops::binary(*op, &left, &right, self.limits.max_sequence_len)
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, env)?.truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Call { func, args } => {
                let callee = self.eval(func, env)?;
                let mut positional = Vec::with_capacity(args.len());
                let mut keywords = Vec::new();
                for arg in args {
                    match arg {
                        Arg::Positional(expr) => positional.push(self.eval(expr, env)?),
                        Arg::Keyword(name, expr) => {
                            keywords.push((name.clone(), self.eval(expr, env)?));
                        }
                    }
                }
                self.call_value(&callee, positional, keywords)
            }
            Expr::Member { object, field } => {
                let object = self.eval(object, env)?;
                ops::attribute(&object, field)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                match index.as_ref() {
                    Subscript::Single(index) => {
                        let index = self.eval(index, env)?;
                        ops::get_item(&object, &index)
                    }
                    Subscript::Slice { start, stop, step } => {
                        let start = self.eval_optional(start.as_ref(), env)?;
                        let stop = self.eval_optional(stop.as_ref(), env)?;
                        let step = self.eval_optional(step.as_ref(), env)?;
                        ops::slice(&object, start, stop, step)
                    }
                }
            }
            Expr::List(items) => Ok(Value::list(self.eval_all(items, env)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items, env)?)),
            Expr::Dict(entries) => {
                let mut evaluated = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key, env)?;
                    let value = self.eval(value, env)?;
                    evaluated.push((key, value));
                }
                Value::dict(evaluated)
            }
            Expr::Comprehension {
                element,
                target,
                iterable,
                conditions,
            } => {
                let iterable = self.eval(iterable, env)?;
                let scope = Env::child(env);
                let mut items = Vec::new();
                'items: for item in iterable.iter()? {
                    self.tick()?;
                    self.assign(target, item, &scope)?;
                    for condition in conditions {
                        if !self.eval(condition, &scope)?.truthy() {
                            continue 'items;
                        }
                    }
                    items.push(self.eval(element, &scope)?);
                }
                Ok(Value::list(items))
            }
            Expr::FString { parts } => {
                let mut rendered = String::new();
                for part in parts {
                    match part {
                        FStringPart::Text(text) => rendered.push_str(text),
                        FStringPart::Expr { expr, spec } => {
                            let value = self.eval(expr, env)?;
                            let spec = spec.as_deref().unwrap_or("");
                            rendered.push_str(&format_value(&value, spec, self.limits.max_sequence_len)?);
                        }
                    }
                }
                Ok(Value::str(rendered))
            }
        }
    }

    fn eval_optional(&mut self, expr: Option<&Expr>, env: &Rc<Env>) -> EvalResult<Option<Value>> {
        expr.map(|expr| self.eval(expr, env)).transpose()
    }

    fn eval_all(&mut self, exprs: &[Expr], env: &Rc<Env>) -> EvalResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr, env)).collect()
    }

    pub fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult {
        match callee {
            Value::Function(closure) => self.call_closure(closure, args, kwargs),
            Value::Builtin(builtin) => builtin.call(self, args, kwargs),
            Value::Method(method) => {
                methods::call_method(self, &method.receiver, &method.name, args, kwargs)
            }
            other => Err(RuntimeError::Type(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_closure(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult {
        if self.depth >= self.limits.max_call_depth {
            return Err(RuntimeError::RecursionLimit(self.limits.max_call_depth));
        }
        let frame = bind_arguments(closure, args, kwargs)?;

        self.depth += 1;
        let flow = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            self.exec_block(&closure.decl.body, &frame)
        });
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::None),
        }
    }
}

/// Creates the call frame for `closure`, matching arguments to parameters.
fn bind_arguments(
    closure: &Closure,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> EvalResult<Rc<Env>> {
    let name = &closure.name;
    let params = &closure.decl.params;

    if args.len() > params.len() {
        let expected = params.len();
        let plural = if expected == 1 { "" } else { "s" };
        return Err(RuntimeError::Type(format!(
            "{name}() takes {expected} positional argument{plural} but {} were given",
            args.len()
        )));
    }

    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, arg) in slots.iter_mut().zip(args) {
        *slot = Some(arg);
    }
    for (key, value) in kwargs {
        let Some(position) = params.iter().position(|param| param.name == key) else {
            return Err(RuntimeError::Type(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        };
        if slots[position].is_some() {
            return Err(RuntimeError::Type(format!(
                "{name}() got multiple values for argument '{key}'"
            )));
        }
        slots[position] = Some(value);
    }

    let frame = Env::child(&closure.env);
    let mut missing = Vec::new();
    for ((param, slot), default) in params.iter().zip(slots).zip(&closure.defaults) {
        match slot.or_else(|| default.clone()) {
            Some(value) => frame.set(param.name.clone(), value),
            None => missing.push(format!("'{}'", param.name)),
        }
    }
    if !missing.is_empty() {
        let plural = if missing.len() == 1 { "" } else { "s" };
        return Err(RuntimeError::Type(format!(
            "{name}() missing {} required positional argument{plural}: {}",
            missing.len(),
            join_names(&missing)
        )));
    }
    Ok(frame)
}

/// `'a'`, `'a' and 'b'`, `'a', 'b', and 'c'`.
fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [single] => single.clone(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::String(text) => Value::str(text),
        Literal::Int(value) => Value::Int(*value),
        Literal::Float(value) => Value::Float(*value),
        Literal::Bool(flag) => Value::Bool(*flag),
        Literal::None => Value::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::nodes::Param;

    fn closure(params: Vec<Param>, defaults: Vec<Option<Value>>) -> Closure {
        Closure {
            name: "f".to_string(),
            decl: Rc::new(Function::new("f", params, None, Block::default())),
            defaults,
            env: Env::global(),
        }
    }

    #[test]
    fn missing_arguments_are_listed() {
        let f = closure(
            vec![
                Param::new("a", None, None),
                Param::new("b", None, None),
                Param::new("c", None, None),
            ],
            vec![None, None, None],
        );
        let err = bind_arguments(&f, vec![], vec![]).err();
        assert_eq!(
            err.map(|err| err.to_string()),
            Some("TypeError: f() missing 3 required positional arguments: 'a', 'b', and 'c'".to_string())
        );
    }

    #[test]
    fn keywords_and_defaults_fill_slots() -> Result<(), RuntimeError> {
        let f = closure(
            vec![Param::new("a", None, None), Param::new("b", None, None)],
            vec![None, Some(Value::Int(2))],
        );
        let frame = bind_arguments(&f, vec![], vec![("a".to_string(), Value::Int(1))])?;
        assert_eq!(frame.get("a"), Some(Value::Int(1)));
        assert_eq!(frame.get("b"), Some(Value::Int(2)));

        let err = bind_arguments(&f, vec![Value::Int(1)], vec![("a".to_string(), Value::Int(1))]);
        assert!(matches!(err, Err(RuntimeError::Type(message)) if message.contains("multiple values")));
        Ok(())
    }

    #[test]
    fn step_budget_is_enforced() {
        let mut interpreter = Interpreter::new(ExecutionLimits {
            max_call_depth: 10,
            max_steps: 3,
            ..ExecutionLimits::default()
        });
        let body = Block::new(vec![
            Statement::While {
                cond: Expr::Literal(Literal::Bool(true)),
                body: Block::new(vec![Statement::Pass]),
            },
        ]);
        let result = interpreter.exec_block(&body, &Env::global());
        assert!(matches!(result, Err(RuntimeError::StepLimit(3))));
    }
}
