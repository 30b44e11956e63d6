use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::nodes::{repr_float, repr_str, Function};

use super::builtins::Builtin;
use super::env::Env;
use super::error::RuntimeError;

/// A value of the evaluated language.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    Range(RangeValue),
    Function(Rc<Closure>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
    Exception(Rc<ExceptionValue>),
    Module(Rc<NativeModule>),
}

impl Value {
    pub fn str(value: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(value.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(items))
    }

    pub fn dict(entries: Vec<(Value, Value)>) -> Result<Self, RuntimeError> {
        let mut dict = Dict::default();
        for (key, value) in entries {
            dict.insert(key, value)?;
        }
        Ok(Value::Dict(Rc::new(RefCell::new(dict))))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Builtin(_) | Value::Method(_) => "builtin_function_or_method",
            Value::Exception(_) => "Exception",
            Value::Module(_) => "module",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            Value::Float(value) => *value != 0.0,
            Value::Str(value) => !value.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            Value::Range(range) => range.len() > 0,
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Builtin(_) | Value::Method(_)
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            Value::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Python `repr()`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.render(&mut out, &mut Vec::new());
        out
    }

    /// Writes the `repr` of `self`. `open` holds the containers currently being
    /// rendered; meeting one again prints `[...]` or `{...}`.
    fn render(&self, out: &mut String, open: &mut Vec<usize>) {
        match self {
            Value::Str(value) => out.push_str(&repr_str(value)),
            Value::List(items) => {
                let id = Rc::as_ptr(items).cast::<()>() as usize;
                if open.contains(&id) {
                    out.push_str("[...]");
                    return;
                }
                open.push(id);
                out.push('[');
                render_items(&items.borrow(), out, open);
                out.push(']');
                open.pop();
            }
            Value::Tuple(items) => {
                out.push('(');
                render_items(items, out, open);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(dict) => {
                let id = Rc::as_ptr(dict).cast::<()>() as usize;
                if open.contains(&id) {
                    out.push_str("{...}");
                    return;
                }
                open.push(id);
                out.push('{');
                for (index, (key, value)) in dict.borrow().iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    render_nested(key, out, open);
                    out.push_str(": ");
                    render_nested(value, out, open);
                }
                out.push('}');
                open.pop();
            }
            other => out.push_str(&other.to_string()),
        }
    }

    /// Python `==`.
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow())
            }
            (Value::Tuple(a), Value::Tuple(b)) => seq_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b) || a.borrow().same_entries(&b.borrow()),
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name() == b.name(),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => a.name == b.name,
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                match (self.as_float(), other.as_float()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => match (self.as_int(), other.as_int()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Python `is`; value types compare by value.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }

    /// Python ordering for `<`, `sorted`, `min` and `max`.
    pub fn compare(&self, other: &Value) -> Result<Ordering, RuntimeError> {
        let ordering = match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => return seq_cmp(&a.borrow(), &b.borrow()),
            (Value::Tuple(a), Value::Tuple(b)) => return seq_cmp(a, b),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            _ => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };
        ordering.ok_or_else(|| {
            RuntimeError::Type(format!(
                "'<' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))
        })
    }

    /// Iterates the value the way a `for` loop would.
    pub fn iter(&self) -> Result<ValueIter, RuntimeError> {
        let items = match self {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.to_vec(),
            Value::Str(text) => text.chars().map(|ch| Value::str(ch.to_string())).collect(),
            Value::Dict(dict) => dict.borrow().keys(),
            Value::Range(range) => return Ok(ValueIter::Range(*range)),
            other => {
                return Err(RuntimeError::Type(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )));
            }
        };
        Ok(ValueIter::Items(items.into_iter()))
    }

    pub fn to_vec(&self) -> Result<Vec<Value>, RuntimeError> {
        Ok(self.iter()?.collect())
    }

    pub fn contains(&self, item: &Value) -> Result<bool, RuntimeError> {
        match self {
            Value::Str(text) => match item {
                Value::Str(needle) => Ok(text.contains(needle.as_ref())),
                other => Err(RuntimeError::Type(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            Value::Dict(dict) => Ok(dict.borrow().get(item)?.is_some()),
            Value::Range(range) => Ok(match item.as_int() {
                Some(value) => range.contains(value),
                None => false,
            }),
            other => Ok(other.iter()?.any(|candidate| candidate.py_eq(item))),
        }
    }
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
}

fn seq_cmp(a: &[Value], b: &[Value]) -> Result<Ordering, RuntimeError> {
    for (x, y) in a.iter().zip(b) {
        if !x.py_eq(y) {
            return x.compare(y);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.py_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

/// Python `str()`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => f.write_str(&repr_float(*value)),
            Value::Str(value) => f.write_str(value),
            Value::List(_) | Value::Tuple(_) | Value::Dict(_) => f.write_str(&self.repr()),
            Value::Range(range) if range.step == 1 => {
                write!(f, "range({}, {})", range.start, range.stop)
            }
            Value::Range(range) => {
                write!(f, "range({}, {}, {})", range.start, range.stop, range.step)
            }
            Value::Function(closure) => write!(f, "<function {}>", closure.name),
            Value::Builtin(builtin) => write!(f, "<built-in function {}>", builtin.name()),
            Value::Method(method) => write!(
                f,
                "<built-in method {} of {} object>",
                method.name,
                method.receiver.type_name()
            ),
            Value::Exception(exception) => f.write_str(&exception.message),
            Value::Module(module) => write!(f, "<module '{}'>", module.name),
        }
    }
}

/// Nested containers may be arbitrarily deep, so each level gets stack headroom.
fn render_nested(value: &Value, out: &mut String, open: &mut Vec<usize>) {
    stacker::maybe_grow(64 * 1024, 1024 * 1024, || value.render(out, open));
}

fn render_items(items: &[Value], out: &mut String, open: &mut Vec<usize>) {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        render_nested(item, out, open);
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (
            i128::from(self.start),
            i128::from(self.stop),
            i128::from(self.step),
        );
        let span = if step > 0 {
            (stop - start + step - 1) / step
        } else {
            (start - stop - step - 1) / -step
        };
        usize::try_from(span).unwrap_or(0)
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        let offset = i64::try_from(index).ok()?.checked_mul(self.step)?;
        (index < self.len()).then(|| self.start + offset)
    }

    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            self.start <= value && value < self.stop
        } else {
            self.stop < value && value <= self.start
        };
        in_bounds && (value - self.start) % self.step == 0
    }
}

pub enum ValueIter {
    Items(std::vec::IntoIter<Value>),
    Range(RangeValue),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Items(items) => items.next(),
            ValueIter::Range(range) => {
                let done = if range.step > 0 {
                    range.start >= range.stop
                } else {
                    range.start <= range.stop
                };
                if done {
                    return None;
                }
                let current = range.start;
                range.start = current.saturating_add(range.step);
                Some(Value::Int(current))
            }
        }
    }
}

/// Hashable projection of a value used to index dictionaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
}

impl HashKey {
    fn of(value: &Value) -> Result<Self, RuntimeError> {
        Ok(match value {
            Value::None => HashKey::None,
            Value::Bool(flag) => HashKey::Int(i64::from(*flag)),
            Value::Int(value) => HashKey::Int(*value),
            Value::Float(value)
                if value.fract() == 0.0 && value.abs() < 9.0e18 =>
            {
                HashKey::Int(*value as i64)
            }
            Value::Float(value) => HashKey::Float(value.to_bits()),
            Value::Str(value) => HashKey::Str(value.clone()),
            Value::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(HashKey::of)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            other => {
                return Err(RuntimeError::Type(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                )));
            }
        })
    }
}

/// Insertion-ordered dictionary.
#[derive(Default, Clone)]
pub struct Dict {
    index: HashMap<HashKey, usize>,
    entries: Vec<(Value, Value)>,
}

impl Dict {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, RuntimeError> {
        let hash_key = HashKey::of(key)?;
        Ok(self
            .index
            .get(&hash_key)
            .map(|&slot| self.entries[slot].1.clone()))
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), RuntimeError> {
        let hash_key = HashKey::of(&key)?;
        match self.index.get(&hash_key) {
            Some(&slot) => self.entries[slot].1 = value,
            None => {
                self.index.insert(hash_key, self.entries.len());
                self.entries.push((key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, RuntimeError> {
        let hash_key = HashKey::of(key)?;
        let Some(slot) = self.index.remove(&hash_key) else {
            return Ok(None);
        };
        let (_, value) = self.entries.remove(slot);
        for position in self.index.values_mut() {
            if *position > slot {
                *position -= 1;
            }
        }
        Ok(Some(value))
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, value)| value.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }

    fn same_entries(&self, other: &Dict) -> bool {
        self.len() == other.len()
            && self.entries.iter().all(|(key, value)| {
                matches!(other.get(key), Ok(Some(found)) if found.py_eq(value))
            })
    }
}

/// A user function together with the scope it was defined in.
pub struct Closure {
    pub name: String,
    pub decl: Rc<Function>,
    /// Defaults evaluated when the `def` statement ran, aligned with `decl.params`.
    pub defaults: Vec<Option<Value>>,
    pub env: Rc<Env>,
}

pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

pub struct ExceptionValue {
    pub kind: String,
    pub message: String,
}

/// One of the allow-listed importable modules.
pub struct NativeModule {
    pub name: &'static str,
    pub members: HashMap<&'static str, Value>,
    /// Unknown attributes resolve to `None` instead of failing (`typing`).
    pub permissive: bool,
}

impl NativeModule {
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match self.members.get(name) {
            Some(value) => Some(value.clone()),
            None if self.permissive => Some(Value::None),
            None => None,
        }
    }
}
