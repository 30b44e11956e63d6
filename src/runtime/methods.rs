use std::cell::RefCell;

use super::builtins::{arity, expect_int, no_kwargs, pairs_of, sort_values, take_kwarg};
use super::error::RuntimeError;
use super::format::format_template;
use super::interpreter::Interpreter;
use super::ops::bounded_len;
use super::value::{Dict, Value};

const STR_METHODS: &[&str] = &[
    "upper", "lower", "casefold", "strip", "lstrip", "rstrip", "split", "rsplit", "splitlines",
    "join", "startswith", "endswith", "replace", "find", "rfind", "index", "count", "isdigit",
    "isnumeric", "isdecimal", "isalpha", "isalnum", "isspace", "isupper", "islower", "title",
    "capitalize", "swapcase", "format", "zfill", "center", "ljust", "rjust", "partition",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "sort", "reverse", "clear",
    "copy",
];

const TUPLE_METHODS: &[&str] = &["index", "count"];

const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "pop", "setdefault", "update", "clear", "copy",
];

pub fn has_method(receiver: &Value, name: &str) -> bool {
    let table = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        Value::Dict(_) => DICT_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

pub fn call_method(
    interpreter: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    match receiver {
        Value::Str(text) => str_method(text, name, args, kwargs, interpreter.max_sequence_len()),
        Value::List(items) => list_method(interpreter, items, name, args, kwargs),
        Value::Tuple(items) => {
            no_kwargs(name, &kwargs)?;
            sequence_method(items, name, &args, "tuple")
        }
        Value::Dict(dict) => {
            no_kwargs(name, &kwargs)?;
            dict_method(dict, name, args)
        }
        other => Err(RuntimeError::Attribute(format!(
            "'{}' object has no attribute '{name}'",
            other.type_name()
        ))),
    }
}

fn str_arg<'a>(method: &str, value: &'a Value) -> Result<&'a str, RuntimeError> {
    value.as_str().ok_or_else(|| {
        RuntimeError::Type(format!(
            "{method}() argument must be str, not {}",
            value.type_name()
        ))
    })
}

fn optional_chars(method: &str, args: &[Value]) -> Result<Option<Vec<char>>, RuntimeError> {
    match args.first() {
        None | Some(Value::None) => Ok(None),
        Some(value) => Ok(Some(str_arg(method, value)?.chars().collect())),
    }
}

fn char_index(text: &str, byte_index: usize) -> i64 {
    i64::try_from(text[..byte_index].chars().count()).unwrap_or(i64::MAX)
}

fn affix_matches(
    method: &str,
    text: &str,
    pattern: &Value,
    test: fn(&str, &str) -> bool,
) -> Result<bool, RuntimeError> {
    match pattern {
        Value::Tuple(options) => {
            for option in options.iter() {
                if test(text, str_arg(method, option)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Ok(test(text, str_arg(method, other)?)),
    }
}

/// `center`, `ljust` and `rjust`.
fn justify(
    method: &str,
    text: &str,
    args: &[Value],
    max_len: usize,
) -> Result<Value, RuntimeError> {
    arity(method, args, 1, 2)?;
    let width = usize::try_from(expect_int(method, &args[0])?).unwrap_or(0);
    bounded_len(1, width, max_len)?;
    let fill = match args.get(1) {
        Some(value) => {
            let fill = str_arg(method, value)?;
            let mut chars = fill.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => ch,
                _ => {
                    return Err(RuntimeError::Type(
                        "The fill character must be exactly one character long".to_string(),
                    ));
                }
            }
        }
        None => ' ',
    };
    let len = text.chars().count();
    if len >= width {
        return Ok(Value::str(text));
    }
    let padding = width - len;
    let (left, right) = match method {
        "ljust" => (0, padding),
        "rjust" => (padding, 0),
        _ => {
            let left = padding / 2 + (padding & width & 1);
            (left, padding - left)
        }
    };
    let fill = fill.to_string();
    Ok(Value::str(format!(
        "{}{text}{}",
        fill.repeat(left),
        fill.repeat(right)
    )))
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_cased = false;
    for ch in text.chars() {
        if previous_cased {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        previous_cased = ch.is_alphabetic();
    }
    out
}

fn all_chars(text: &str, test: fn(char) -> bool) -> Value {
    Value::Bool(!text.is_empty() && text.chars().all(test))
}

fn str_method(
    text: &str,
    name: &str,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
    max_len: usize,
) -> Result<Value, RuntimeError> {
    if name == "format" {
        return format_template(text, &args, &kwargs, max_len).map(Value::str);
    }
    let sep_kw = take_kwarg(&mut kwargs, "sep");
    let maxsplit_kw = take_kwarg(&mut kwargs, "maxsplit");
    no_kwargs(name, &kwargs)?;

    let result = match name {
        "upper" => Value::str(text.to_uppercase()),
        "lower" | "casefold" => Value::str(text.to_lowercase()),
        "swapcase" => Value::str(
            text.chars()
                .flat_map(|ch| {
                    if ch.is_uppercase() {
                        ch.to_lowercase().collect::<Vec<_>>()
                    } else {
                        ch.to_uppercase().collect::<Vec<_>>()
                    }
                })
                .collect::<String>(),
        ),
        "strip" | "lstrip" | "rstrip" => {
            arity(name, &args, 0, 1)?;
            let chars = optional_chars(name, &args)?;
            let matches = |ch: char| match &chars {
                Some(set) => set.contains(&ch),
                None => ch.is_whitespace(),
            };
            let stripped = match name {
                "strip" => text.trim_matches(matches),
                "lstrip" => text.trim_start_matches(matches),
                _ => text.trim_end_matches(matches),
            };
            Value::str(stripped)
        }
        "split" | "rsplit" => {
            arity(name, &args, 0, 2)?;
            let sep = args.first().cloned().or(sep_kw);
            let maxsplit = match args.get(1).cloned().or(maxsplit_kw) {
                Some(value) => expect_int(name, &value)?,
                None => -1,
            };
            let parts: Vec<String> = match sep {
                None | Some(Value::None) => {
                    text.split_whitespace().map(str::to_string).collect()
                }
                Some(sep) => {
                    let sep = str_arg(name, &sep)?;
                    if sep.is_empty() {
                        return Err(RuntimeError::Value("empty separator".to_string()));
                    }
                    match (usize::try_from(maxsplit), name) {
                        (Ok(limit), "split") => {
                            text.splitn(limit + 1, sep).map(str::to_string).collect()
                        }
                        (Ok(limit), _) => {
                            let mut parts: Vec<String> =
                                text.rsplitn(limit + 1, sep).map(str::to_string).collect();
                            parts.reverse();
                            parts
                        }
                        (Err(_), _) => text.split(sep).map(str::to_string).collect(),
                    }
                }
            };
            Value::list(parts.into_iter().map(Value::str).collect())
        }
        "splitlines" => Value::list(text.lines().map(Value::str).collect()),
        "join" => {
            arity(name, &args, 1, 1)?;
            let mut pieces = Vec::new();
            for (idx, item) in args[0].iter()?.enumerate() {
                match item {
                    Value::Str(piece) => pieces.push(piece),
                    other => {
                        return Err(RuntimeError::Type(format!(
                            "sequence item {idx}: expected str instance, {} found",
                            other.type_name()
                        )));
                    }
                }
            }
            let pieces: Vec<&str> = pieces.iter().map(|piece| piece.as_ref()).collect();
            Value::str(pieces.join(text))
        }
        "startswith" | "endswith" => {
            arity(name, &args, 1, 1)?;
            let test: fn(&str, &str) -> bool = if name == "startswith" {
                |text, affix| text.starts_with(affix)
            } else {
                |text, affix| text.ends_with(affix)
            };
            Value::Bool(affix_matches(name, text, &args[0], test)?)
        }
        "replace" => {
            arity(name, &args, 2, 3)?;
            let old = str_arg(name, &args[0])?;
            let new = str_arg(name, &args[1])?;
            let occurrences = if old.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(old).count()
            };
            let inserted = bounded_len(new.len(), occurrences, max_len)?;
            bounded_len(1, inserted.saturating_add(text.len()), max_len)?;
            match args.get(2).map(|count| expect_int(name, count)).transpose()? {
                Some(count) if count >= 0 => {
                    let count = usize::try_from(count).unwrap_or(usize::MAX);
                    Value::str(text.replacen(old, new, count))
                }
                _ => Value::str(text.replace(old, new)),
            }
        }
        "find" | "rfind" | "index" => {
            arity(name, &args, 1, 1)?;
            let needle = str_arg(name, &args[0])?;
            let found = if name == "rfind" {
                text.rfind(needle)
            } else {
                text.find(needle)
            };
            match found {
                Some(byte_index) => Value::Int(char_index(text, byte_index)),
                None if name == "index" => {
                    return Err(RuntimeError::Value("substring not found".to_string()));
                }
                None => Value::Int(-1),
            }
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let needle = str_arg(name, &args[0])?;
            let count = if needle.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(needle).count()
            };
            Value::Int(i64::try_from(count).unwrap_or(i64::MAX))
        }
        "isdigit" | "isnumeric" | "isdecimal" => all_chars(text, |ch| ch.is_ascii_digit()),
        "isalpha" => all_chars(text, char::is_alphabetic),
        "isalnum" => all_chars(text, char::is_alphanumeric),
        "isspace" => all_chars(text, char::is_whitespace),
        "isupper" => Value::Bool(
            text.chars().any(char::is_alphabetic)
                && !text.chars().any(char::is_lowercase),
        ),
        "islower" => Value::Bool(
            text.chars().any(char::is_alphabetic)
                && !text.chars().any(char::is_uppercase),
        ),
        "title" => Value::str(title_case(text)),
        "capitalize" => {
            let mut chars = text.chars();
            let capitalized = match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.as_str().to_lowercase().chars())
                    .collect::<String>(),
                None => String::new(),
            };
            Value::str(capitalized)
        }
        "zfill" => {
            arity(name, &args, 1, 1)?;
            let width = usize::try_from(expect_int(name, &args[0])?).unwrap_or(0);
            bounded_len(1, width, max_len)?;
            let len = text.chars().count();
            if len >= width {
                Value::str(text)
            } else {
                let zeros = "0".repeat(width - len);
                let filled = match text.strip_prefix(['-', '+']) {
                    Some(rest) => format!("{}{zeros}{rest}", &text[..1]),
                    None => format!("{zeros}{text}"),
                };
                Value::str(filled)
            }
        }
        "center" | "ljust" | "rjust" => justify(name, text, &args, max_len)?,
        "partition" => {
            arity(name, &args, 1, 1)?;
            let sep = str_arg(name, &args[0])?;
            let parts = match text.split_once(sep) {
                Some((head, tail)) => [head, sep, tail],
                None => [text, "", ""],
            };
            Value::tuple(parts.into_iter().map(Value::str).collect())
        }
        other => {
            return Err(RuntimeError::Attribute(format!(
                "'str' object has no attribute '{other}'"
            )));
        }
    };
    Ok(result)
}

fn position_of(items: &[Value], needle: &Value, type_name: &str) -> Result<usize, RuntimeError> {
    items
        .iter()
        .position(|item| item.py_eq(needle))
        .ok_or_else(|| RuntimeError::Value(format!("{} is not in {type_name}", needle.repr())))
}

fn sequence_method(
    items: &[Value],
    name: &str,
    args: &[Value],
    type_name: &str,
) -> Result<Value, RuntimeError> {
    match name {
        "index" => {
            arity(name, args, 1, 1)?;
            let position = position_of(items, &args[0], type_name)?;
            Ok(Value::Int(i64::try_from(position).unwrap_or(i64::MAX)))
        }
        "count" => {
            arity(name, args, 1, 1)?;
            let count = items.iter().filter(|item| item.py_eq(&args[0])).count();
            Ok(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
        }
        other => Err(RuntimeError::Attribute(format!(
            "'{type_name}' object has no attribute '{other}'"
        ))),
    }
}

fn list_method(
    interpreter: &mut Interpreter,
    items: &RefCell<Vec<Value>>,
    name: &str,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    if name == "sort" {
        let key = take_kwarg(&mut kwargs, "key");
        let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|value| value.truthy());
        no_kwargs(name, &kwargs)?;
        arity(name, &args, 0, 0)?;
        let mut sorted = items.borrow().clone();
        sort_values(interpreter, &mut sorted, key.as_ref(), reverse)?;
        *items.borrow_mut() = sorted;
        return Ok(Value::None);
    }
    no_kwargs(name, &kwargs)?;

    match name {
        "append" => {
            arity(name, &args, 1, 1)?;
            let mut args = args;
            items.borrow_mut().extend(args.pop());
            Ok(Value::None)
        }
        "extend" => {
            arity(name, &args, 1, 1)?;
            let extra = args[0].to_vec()?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 0, 1)?;
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(RuntimeError::Index("pop from empty list".to_string()));
            }
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let index = match args.first() {
                Some(index) => expect_int(name, index)?,
                None => -1,
            };
            let adjusted = if index < 0 { index + len } else { index };
            let slot = usize::try_from(adjusted)
                .ok()
                .filter(|slot| *slot < items.len())
                .ok_or_else(|| RuntimeError::Index("pop index out of range".to_string()))?;
            Ok(items.remove(slot))
        }
        "insert" => {
            arity(name, &args, 2, 2)?;
            let mut items = items.borrow_mut();
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let index = expect_int(name, &args[0])?;
            let adjusted = if index < 0 { (index + len).max(0) } else { index.min(len) };
            let slot = usize::try_from(adjusted).unwrap_or(0);
            items.insert(slot, args[1].clone());
            Ok(Value::None)
        }
        "remove" => {
            arity(name, &args, 1, 1)?;
            let position = items
                .borrow()
                .iter()
                .position(|item| item.py_eq(&args[0]))
                .ok_or_else(|| RuntimeError::Value("list.remove(x): x not in list".to_string()))?;
            items.borrow_mut().remove(position);
            Ok(Value::None)
        }
        "reverse" => {
            arity(name, &args, 0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(items.borrow().clone()))
        }
        _ => {
            let snapshot = items.borrow().clone();
            sequence_method(&snapshot, name, &args, "list")
        }
    }
}

fn dict_method(dict: &RefCell<Dict>, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match name {
        "get" => {
            arity(name, &args, 1, 2)?;
            let found = dict.borrow().get(&args[0])?;
            Ok(found.or_else(|| args.get(1).cloned()).unwrap_or(Value::None))
        }
        "keys" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().keys()))
        }
        "values" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().values()))
        }
        "items" => {
            arity(name, &args, 0, 0)?;
            let pairs = dict
                .borrow()
                .iter()
                .map(|(key, value)| Value::tuple(vec![key.clone(), value.clone()]))
                .collect();
            Ok(Value::list(pairs))
        }
        "pop" => {
            arity(name, &args, 1, 2)?;
            let removed = dict.borrow_mut().remove(&args[0])?;
            match (removed, args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(RuntimeError::Key(args[0].repr())),
            }
        }
        "setdefault" => {
            arity(name, &args, 1, 2)?;
            let existing = dict.borrow().get(&args[0])?;
            match existing {
                Some(value) => Ok(value),
                None => {
                    let default = args.get(1).cloned().unwrap_or(Value::None);
                    dict.borrow_mut().insert(args[0].clone(), default.clone())?;
                    Ok(default)
                }
            }
        }
        "update" => {
            arity(name, &args, 0, 1)?;
            if let Some(source) = args.first() {
                let pairs = pairs_of(source)?;
                let mut dict = dict.borrow_mut();
                for (key, value) in pairs {
                    dict.insert(key, value)?;
                }
            }
            Ok(Value::None)
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Dict(std::rc::Rc::new(RefCell::new(dict.borrow().clone()))))
        }
        other => Err(RuntimeError::Attribute(format!(
            "'dict' object has no attribute '{other}'"
        ))),
    }
}
