use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::ast::nodes::BinaryOp;

use super::error::RuntimeError;
use super::format::format_value;
use super::interpreter::Interpreter;
use super::ops;
use super::value::{ExceptionValue, RangeValue, Value};

pub type BuiltinFn =
    fn(&mut Interpreter, Vec<Value>, Vec<(String, Value)>) -> Result<Value, RuntimeError>;

#[derive(Clone, Copy)]
enum BuiltinKind {
    Function(BuiltinFn),
    /// Calling an exception class builds an exception value.
    Exception,
}

/// A function implemented natively and visible to generated code.
#[derive(Clone, Copy)]
pub struct Builtin {
    name: &'static str,
    kind: BuiltinKind,
}

impl Builtin {
    pub const fn function(name: &'static str, func: BuiltinFn) -> Self {
        Self {
            name,
            kind: BuiltinKind::Function(func),
        }
    }

    const fn exception(name: &'static str) -> Self {
        Self {
            name,
            kind: BuiltinKind::Exception,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_exception_class(&self) -> bool {
        matches!(self.kind, BuiltinKind::Exception)
    }

    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        match self.kind {
            BuiltinKind::Function(func) => func(interpreter, args, kwargs),
            BuiltinKind::Exception => {
                no_kwargs(self.name, &kwargs)?;
                let message = match args.as_slice() {
                    [] => String::new(),
                    [single] => single.to_string(),
                    _ => Value::tuple(args).repr(),
                };
                Ok(Value::Exception(Rc::new(ExceptionValue {
                    kind: self.name.to_string(),
                    message,
                })))
            }
        }
    }
}

const EXCEPTION_CLASSES: &[&str] = &[
    "Exception",
    "ValueError",
    "TypeError",
    "KeyError",
    "IndexError",
    "ZeroDivisionError",
    "RuntimeError",
    "NotImplementedError",
    "ArithmeticError",
    "AssertionError",
    "OverflowError",
    "RecursionError",
];

static BUILTINS: Lazy<HashMap<&'static str, Builtin>> = Lazy::new(|| {
    let functions: &[(&'static str, BuiltinFn)] = &[
        ("print", builtin_print),
        ("len", builtin_len),
        ("range", builtin_range),
        ("abs", builtin_abs),
        ("min", builtin_min),
        ("max", builtin_max),
        ("sum", builtin_sum),
        ("str", builtin_str),
        ("repr", builtin_repr),
        ("int", builtin_int),
        ("float", builtin_float),
        ("bool", builtin_bool),
        ("list", builtin_list),
        ("tuple", builtin_tuple),
        ("dict", builtin_dict),
        ("sorted", builtin_sorted),
        ("reversed", builtin_reversed),
        ("enumerate", builtin_enumerate),
        ("zip", builtin_zip),
        ("round", builtin_round),
        ("isinstance", builtin_isinstance),
        ("type", builtin_type),
        ("pow", builtin_pow),
        ("divmod", builtin_divmod),
        ("any", builtin_any),
        ("all", builtin_all),
        ("map", builtin_map),
        ("filter", builtin_filter),
        ("chr", builtin_chr),
        ("ord", builtin_ord),
        ("format", builtin_format),
        ("callable", builtin_callable),
    ];

    let mut table = HashMap::new();
    for &(name, func) in functions {
        table.insert(name, Builtin::function(name, func));
    }
    for &name in EXCEPTION_CLASSES {
        table.insert(name, Builtin::exception(name));
    }
    table
});

pub fn lookup(name: &str) -> Option<Value> {
    BUILTINS.get(name).copied().map(Value::Builtin)
}

pub(crate) fn arity(
    name: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), RuntimeError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {min}")
    } else if args.len() < min {
        format!("at least {min}")
    } else {
        format!("at most {max}")
    };
    let noun = if min == max && min == 1 { "argument" } else { "arguments" };
    Err(RuntimeError::Type(format!(
        "{name}() takes {expected} {noun} ({} given)",
        args.len()
    )))
}

pub(crate) fn no_kwargs(name: &str, kwargs: &[(String, Value)]) -> Result<(), RuntimeError> {
    match kwargs.first() {
        Some((key, _)) => Err(RuntimeError::Type(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        ))),
        None => Ok(()),
    }
}

/// Removes `key` from the keyword arguments, returning its value.
pub(crate) fn take_kwarg(kwargs: &mut Vec<(String, Value)>, key: &str) -> Option<Value> {
    let position = kwargs.iter().position(|(name, _)| name == key)?;
    Some(kwargs.remove(position).1)
}

pub(crate) fn expect_int(name: &str, value: &Value) -> Result<i64, RuntimeError> {
    value.as_int().ok_or_else(|| {
        RuntimeError::Type(format!(
            "{name}() argument must be an integer, not '{}'",
            value.type_name()
        ))
    })
}

pub(crate) fn expect_float(name: &str, value: &Value) -> Result<f64, RuntimeError> {
    value.as_float().ok_or_else(|| {
        RuntimeError::Type(format!(
            "{name}() argument must be a real number, not '{}'",
            value.type_name()
        ))
    })
}

/// Stable sort with an optional key function, shared by `sorted` and `list.sort`.
pub(crate) fn sort_values(
    interpreter: &mut Interpreter,
    items: &mut Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> Result<(), RuntimeError> {
    let keys = match key {
        Some(key) if !matches!(key, Value::None) => items
            .iter()
            .map(|item| interpreter.call_value(key, vec![item.clone()], Vec::new()))
            .collect::<Result<Vec<_>, _>>()?,
        _ => items.clone(),
    };

    let mut order: Vec<usize> = (0..items.len()).collect();
    let mut failure = None;
    order.sort_by(|&a, &b| {
        let ordering = keys[a].compare(&keys[b]).unwrap_or_else(|err| {
            failure.get_or_insert(err);
            Ordering::Equal
        });
        if reverse { ordering.reverse() } else { ordering }
    });
    if let Some(err) = failure {
        return Err(err);
    }

    let sorted: Vec<Value> = order.into_iter().map(|slot| items[slot].clone()).collect();
    *items = sorted;
    Ok(())
}

fn builtin_print(
    _: &mut Interpreter,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    let sep = take_kwarg(&mut kwargs, "sep")
        .filter(|value| !matches!(value, Value::None))
        .map(|value| value.to_string())
        .unwrap_or_else(|| " ".to_string());
    let end = take_kwarg(&mut kwargs, "end")
        .filter(|value| !matches!(value, Value::None))
        .map(|value| value.to_string())
        .unwrap_or_else(|| "\n".to_string());
    no_kwargs("print", &kwargs)?;

    let line = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(&sep);
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "{line}{end}");
    Ok(Value::None)
}

fn builtin_len(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("len", &kwargs)?;
    arity("len", &args, 1, 1)?;
    let len = match &args[0] {
        Value::Str(text) => text.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(dict) => dict.borrow().len(),
        Value::Range(range) => range.len(),
        other => {
            return Err(RuntimeError::Type(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    i64::try_from(len).map(Value::Int).map_err(|_| RuntimeError::overflow())
}

fn builtin_range(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("range", &kwargs)?;
    arity("range", &args, 1, 3)?;
    let bounds = args
        .iter()
        .map(|value| expect_int("range", value))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match bounds[..] {
        [stop] => (0, stop, 1),
        [start, stop] => (start, stop, 1),
        [start, stop, step] => (start, stop, step),
        _ => {
            return Err(RuntimeError::Type(format!(
                "range expected at most 3 arguments, got {}",
                bounds.len()
            )));
        }
    };
    if step == 0 {
        return Err(RuntimeError::Value("range() arg 3 must not be zero".to_string()));
    }
    Ok(Value::Range(RangeValue { start, stop, step }))
}

fn builtin_abs(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("abs", &kwargs)?;
    arity("abs", &args, 1, 1)?;
    match &args[0] {
        Value::Float(value) => Ok(Value::Float(value.abs())),
        other => match other.as_int() {
            Some(value) => value
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(RuntimeError::overflow),
            None => Err(RuntimeError::Type(format!(
                "bad operand type for abs(): '{}'",
                other.type_name()
            ))),
        },
    }
}

fn extremum(
    interpreter: &mut Interpreter,
    name: &str,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
    wanted: Ordering,
) -> Result<Value, RuntimeError> {
    let key = take_kwarg(&mut kwargs, "key").filter(|key| !matches!(key, Value::None));
    let default = take_kwarg(&mut kwargs, "default");
    no_kwargs(name, &kwargs)?;
    if args.is_empty() {
        return Err(RuntimeError::Type(format!(
            "{name} expected at least 1 argument, got 0"
        )));
    }

    let items = if args.len() == 1 {
        args[0].to_vec()?
    } else {
        args
    };

    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let item_key = match &key {
            Some(key) => interpreter.call_value(key, vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((_, best_key)) => item_key.compare(best_key)? == wanted,
        };
        if replace {
            best = Some((item, item_key));
        }
    }

    match (best, default) {
        (Some((item, _)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(RuntimeError::Value(format!(
            "{name}() arg is an empty sequence"
        ))),
    }
}

fn builtin_min(
    interpreter: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    extremum(interpreter, "min", args, kwargs, Ordering::Less)
}

fn builtin_max(
    interpreter: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    extremum(interpreter, "max", args, kwargs, Ordering::Greater)
}

fn builtin_sum(
    interpreter: &mut Interpreter,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    let start_kw = take_kwarg(&mut kwargs, "start");
    no_kwargs("sum", &kwargs)?;
    arity("sum", &args, 1, 2)?;
    let mut total = args.get(1).cloned().or(start_kw).unwrap_or(Value::Int(0));
    if matches!(total, Value::Str(_)) {
        return Err(RuntimeError::Type(
            "sum() can't sum strings [use ''.join(seq) instead]".to_string(),
        ));
    }
    for item in args[0].iter()? {
        total = ops::binary(BinaryOp::Add, &total, &item, interpreter.max_sequence_len())?;
    }
    Ok(total)
}

fn builtin_str(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("str", &kwargs)?;
    arity("str", &args, 0, 1)?;
    Ok(match args.first() {
        Some(Value::Str(text)) => Value::Str(text.clone()),
        Some(value) => Value::str(value.to_string()),
        None => Value::str(""),
    })
}

fn builtin_repr(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("repr", &kwargs)?;
    arity("repr", &args, 1, 1)?;
    Ok(Value::str(args[0].repr()))
}

fn float_to_int(value: f64) -> Result<i64, RuntimeError> {
    if value.is_nan() {
        return Err(RuntimeError::Value(
            "cannot convert float NaN to integer".to_string(),
        ));
    }
    if value.is_infinite() {
        return Err(RuntimeError::Overflow(
            "cannot convert float infinity to integer".to_string(),
        ));
    }
    let truncated = value.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(RuntimeError::overflow());
    }
    Ok(truncated as i64)
}

fn parse_int(text: &str, base: u32) -> Result<i64, RuntimeError> {
    let invalid = || {
        RuntimeError::Value(format!(
            "invalid literal for int() with base {base}: {}",
            Value::str(text).repr()
        ))
    };
    let cleaned = text.trim().replace('_', "");
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, cleaned.trim_start_matches('+').to_string()),
    };
    let digits = match base {
        16 => digits.trim_start_matches("0x").trim_start_matches("0X").to_string(),
        8 => digits.trim_start_matches("0o").trim_start_matches("0O").to_string(),
        2 => digits.trim_start_matches("0b").trim_start_matches("0B").to_string(),
        _ => digits,
    };
    if digits.is_empty() {
        return Err(invalid());
    }
    let magnitude = i64::from_str_radix(&digits, base).map_err(|_| invalid())?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn builtin_int(
    _: &mut Interpreter,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    let base_kw = take_kwarg(&mut kwargs, "base");
    no_kwargs("int", &kwargs)?;
    arity("int", &args, 0, 2)?;
    let base = match args.get(1).or(base_kw.as_ref()) {
        Some(base) => {
            let base = expect_int("int", base)?;
            u32::try_from(base)
                .ok()
                .filter(|base| (2..=36).contains(base))
                .ok_or_else(|| {
                    RuntimeError::Value("int() base must be >= 2 and <= 36, or 0".to_string())
                })?
        }
        None => 10,
    };

    match args.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Str(text)) => parse_int(text, base).map(Value::Int),
        Some(Value::Float(value)) => float_to_int(*value).map(Value::Int),
        Some(other) => other.as_int().map(Value::Int).ok_or_else(|| {
            RuntimeError::Type(format!(
                "int() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn builtin_float(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("float", &kwargs)?;
    arity("float", &args, 0, 1)?;
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(text)) => {
            let cleaned = text.trim().replace('_', "").to_ascii_lowercase();
            let parsed = match cleaned.trim_start_matches(['+', '-']) {
                "inf" | "infinity" => Some(f64::INFINITY),
                "nan" => Some(f64::NAN),
                _ => None,
            };
            let value = match parsed {
                Some(value) if cleaned.starts_with('-') => Some(-value),
                Some(value) => Some(value),
                None => cleaned.parse::<f64>().ok(),
            };
            value.map(Value::Float).ok_or_else(|| {
                RuntimeError::Value(format!(
                    "could not convert string to float: {}",
                    Value::Str(text.clone()).repr()
                ))
            })
        }
        Some(other) => expect_float("float", other).map(Value::Float),
    }
}

fn builtin_bool(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("bool", &kwargs)?;
    arity("bool", &args, 0, 1)?;
    Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
}

fn builtin_list(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("list", &kwargs)?;
    arity("list", &args, 0, 1)?;
    match args.first() {
        Some(iterable) => Ok(Value::list(iterable.to_vec()?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn builtin_tuple(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("tuple", &kwargs)?;
    arity("tuple", &args, 0, 1)?;
    match args.first() {
        Some(iterable) => Ok(Value::tuple(iterable.to_vec()?)),
        None => Ok(Value::tuple(Vec::new())),
    }
}

/// Turns an iterable of two-item sequences (or a dict) into key/value pairs.
pub(crate) fn pairs_of(value: &Value) -> Result<Vec<(Value, Value)>, RuntimeError> {
    if let Value::Dict(dict) = value {
        return Ok(dict.borrow().iter().cloned().collect());
    }
    value
        .iter()?
        .enumerate()
        .map(|(idx, item)| {
            let parts = item.to_vec()?;
            match <[Value; 2]>::try_from(parts) {
                Ok([key, value]) => Ok((key, value)),
                Err(parts) => Err(RuntimeError::Value(format!(
                    "dictionary update sequence element #{idx} has length {}; 2 is required",
                    parts.len()
                ))),
            }
        })
        .collect()
}

fn builtin_dict(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    arity("dict", &args, 0, 1)?;
    let mut entries = match args.first() {
        Some(source) => pairs_of(source)?,
        None => Vec::new(),
    };
    entries.extend(kwargs.into_iter().map(|(key, value)| (Value::str(key), value)));
    Value::dict(entries)
}

fn builtin_sorted(
    interpreter: &mut Interpreter,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    let key = take_kwarg(&mut kwargs, "key");
    let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|value| value.truthy());
    no_kwargs("sorted", &kwargs)?;
    arity("sorted", &args, 1, 1)?;
    let mut items = args[0].to_vec()?;
    sort_values(interpreter, &mut items, key.as_ref(), reverse)?;
    Ok(Value::list(items))
}

fn builtin_reversed(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("reversed", &kwargs)?;
    arity("reversed", &args, 1, 1)?;
    let mut items = args[0].to_vec()?;
    items.reverse();
    Ok(Value::list(items))
}

fn builtin_enumerate(
    _: &mut Interpreter,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    let start_kw = take_kwarg(&mut kwargs, "start");
    no_kwargs("enumerate", &kwargs)?;
    arity("enumerate", &args, 1, 2)?;
    let start = match args.get(1).or(start_kw.as_ref()) {
        Some(start) => expect_int("enumerate", start)?,
        None => 0,
    };
    let mut counter = start;
    let mut pairs = Vec::new();
    for item in args[0].iter()? {
        pairs.push(Value::tuple(vec![Value::Int(counter), item]));
        counter = counter.checked_add(1).ok_or_else(RuntimeError::overflow)?;
    }
    Ok(Value::list(pairs))
}

fn builtin_zip(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("zip", &kwargs)?;
    let columns = args
        .iter()
        .map(Value::to_vec)
        .collect::<Result<Vec<_>, _>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let zipped = (0..rows)
        .map(|row| Value::tuple(columns.iter().map(|column| column[row].clone()).collect()))
        .collect();
    Ok(Value::list(zipped))
}

fn builtin_round(
    _: &mut Interpreter,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    let digits_kw = take_kwarg(&mut kwargs, "ndigits");
    no_kwargs("round", &kwargs)?;
    arity("round", &args, 1, 2)?;
    let digits = match args.get(1).or(digits_kw.as_ref()) {
        None | Some(Value::None) => None,
        Some(digits) => Some(expect_int("round", digits)?),
    };

    match (&args[0], digits) {
        (Value::Float(value), None) => float_to_int(value.round_ties_even()).map(Value::Int),
        (Value::Float(value), Some(digits)) => {
            let exponent = i32::try_from(digits).map_err(|_| RuntimeError::overflow())?;
            let factor = 10f64.powi(exponent);
            Ok(Value::Float((value * factor).round_ties_even() / factor))
        }
        (other, digits) => {
            let value = expect_int("round", other)?;
            match digits {
                Some(digits) if digits < 0 => {
                    let exponent = u32::try_from(-digits).map_err(|_| RuntimeError::overflow())?;
                    let factor = 10i64.checked_pow(exponent).ok_or_else(RuntimeError::overflow)?;
                    let rounded = (value as f64 / factor as f64).round_ties_even() as i64;
                    rounded.checked_mul(factor).map(Value::Int).ok_or_else(RuntimeError::overflow)
                }
                _ => Ok(Value::Int(value)),
            }
        }
    }
}

fn is_instance(value: &Value, class: &Value) -> Result<bool, RuntimeError> {
    match class {
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if is_instance(value, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Builtin(builtin) if builtin.is_exception_class() => Ok(match value {
            Value::Exception(exception) => {
                builtin.name() == "Exception" || exception.kind == builtin.name()
            }
            _ => false,
        }),
        Value::Builtin(builtin) => Ok(match builtin.name() {
            "int" => matches!(value, Value::Int(_) | Value::Bool(_)),
            "float" => matches!(value, Value::Float(_)),
            "bool" => matches!(value, Value::Bool(_)),
            "str" => matches!(value, Value::Str(_)),
            "list" => matches!(value, Value::List(_)),
            "tuple" => matches!(value, Value::Tuple(_)),
            "dict" => matches!(value, Value::Dict(_)),
            "range" => matches!(value, Value::Range(_)),
            _ => false,
        }),
        // Names imported from `typing` are bound to None.
        Value::None => Ok(false),
        other => Err(RuntimeError::Type(format!(
            "isinstance() arg 2 must be a type or tuple of types, not {}",
            other.type_name()
        ))),
    }
}

fn builtin_isinstance(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("isinstance", &kwargs)?;
    arity("isinstance", &args, 2, 2)?;
    is_instance(&args[0], &args[1]).map(Value::Bool)
}

fn builtin_type(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("type", &kwargs)?;
    arity("type", &args, 1, 1)?;
    let name = match &args[0] {
        Value::Exception(exception) => exception.kind.as_str(),
        other => other.type_name(),
    };
    Ok(lookup(name).unwrap_or_else(|| Value::str(name)))
}

fn builtin_pow(
    interpreter: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("pow", &kwargs)?;
    arity("pow", &args, 2, 3)?;
    let Some(modulus) = args.get(2).filter(|value| !matches!(value, Value::None)) else {
        return ops::binary(BinaryOp::Pow, &args[0], &args[1], interpreter.max_sequence_len());
    };

    let base = i128::from(expect_int("pow", &args[0])?);
    let mut exp = expect_int("pow", &args[1])?;
    let modulus = i128::from(expect_int("pow", modulus)?);
    if modulus == 0 {
        return Err(RuntimeError::Value("pow() 3rd argument cannot be 0".to_string()));
    }
    if exp < 0 {
        return Err(RuntimeError::Value(
            "pow() negative exponent with a modulus is not supported".to_string(),
        ));
    }
    let mut result: i128 = 1;
    let mut factor = base.rem_euclid(modulus.abs());
    while exp > 0 {
        if exp & 1 == 1 {
            result = (result * factor).rem_euclid(modulus.abs());
        }
        factor = (factor * factor).rem_euclid(modulus.abs());
        exp >>= 1;
    }
    if modulus < 0 && result != 0 {
        result += modulus;
    }
    i64::try_from(result).map(Value::Int).map_err(|_| RuntimeError::overflow())
}

fn builtin_divmod(
    interpreter: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("divmod", &kwargs)?;
    arity("divmod", &args, 2, 2)?;
    let max_len = interpreter.max_sequence_len();
    let quotient = ops::binary(BinaryOp::FloorDiv, &args[0], &args[1], max_len)?;
    let remainder = ops::binary(BinaryOp::Mod, &args[0], &args[1], max_len)?;
    Ok(Value::tuple(vec![quotient, remainder]))
}

fn builtin_any(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("any", &kwargs)?;
    arity("any", &args, 1, 1)?;
    Ok(Value::Bool(args[0].iter()?.any(|item| item.truthy())))
}

fn builtin_all(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("all", &kwargs)?;
    arity("all", &args, 1, 1)?;
    Ok(Value::Bool(args[0].iter()?.all(|item| item.truthy())))
}

fn builtin_map(
    interpreter: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("map", &kwargs)?;
    if args.len() < 2 {
        return Err(RuntimeError::Type(
            "map() must have at least two arguments.".to_string(),
        ));
    }
    let columns = args[1..]
        .iter()
        .map(Value::to_vec)
        .collect::<Result<Vec<_>, _>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut mapped = Vec::with_capacity(rows);
    for row in 0..rows {
        let call_args = columns.iter().map(|column| column[row].clone()).collect();
        mapped.push(interpreter.call_value(&args[0], call_args, Vec::new())?);
    }
    Ok(Value::list(mapped))
}

fn builtin_filter(
    interpreter: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("filter", &kwargs)?;
    arity("filter", &args, 2, 2)?;
    let mut kept = Vec::new();
    for item in args[1].iter()? {
        let keep = match &args[0] {
            Value::None => item.truthy(),
            predicate => interpreter
                .call_value(predicate, vec![item.clone()], Vec::new())?
                .truthy(),
        };
        if keep {
            kept.push(item);
        }
    }
    Ok(Value::list(kept))
}

fn builtin_chr(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("chr", &kwargs)?;
    arity("chr", &args, 1, 1)?;
    let code = expect_int("chr", &args[0])?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|ch| Value::str(ch.to_string()))
        .ok_or_else(|| RuntimeError::Value("chr() arg not in range(0x110000)".to_string()))
}

fn builtin_ord(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("ord", &kwargs)?;
    arity("ord", &args, 1, 1)?;
    let text = args[0].as_str().unwrap_or_default();
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(Value::Int(i64::from(u32::from(ch)))),
        _ => Err(RuntimeError::Type(format!(
            "ord() expected a character, but string of length {} found",
            text.chars().count()
        ))),
    }
}

fn builtin_format(
    interpreter: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("format", &kwargs)?;
    arity("format", &args, 1, 2)?;
    let spec = args.get(1).and_then(Value::as_str).unwrap_or_default();
    format_value(&args[0], spec, interpreter.max_sequence_len()).map(Value::str)
}

fn builtin_callable(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("callable", &kwargs)?;
    arity("callable", &args, 1, 1)?;
    Ok(Value::Bool(args[0].is_callable()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integers_in_several_bases() -> Result<(), RuntimeError> {
        assert_eq!(parse_int(" 42 ", 10)?, 42);
        assert_eq!(parse_int("-0x1f", 16)?, -31);
        assert_eq!(parse_int("1_000", 10)?, 1000);
        assert!(parse_int("4.5", 10).is_err());
        Ok(())
    }

    #[test]
    fn arity_messages_read_naturally() {
        let err = arity("len", &[], 1, 1).err().map(|err| err.to_string());
        assert_eq!(
            err.as_deref(),
            Some("TypeError: len() takes exactly 1 argument (0 given)")
        );
    }

    #[test]
    fn exception_classes_are_registered() {
        assert!(matches!(lookup("ValueError"), Some(Value::Builtin(b)) if b.is_exception_class()));
        assert!(lookup("open").is_none());
    }
}
