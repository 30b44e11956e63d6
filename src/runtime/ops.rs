use std::rc::Rc;

use crate::ast::nodes::{BinaryOp, UnaryOp};

use super::error::RuntimeError;
use super::methods;
use super::value::{BoundMethod, Value};

type OpResult = Result<Value, RuntimeError>;

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::Type(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_))
}

/// Applies an arithmetic operator, staying in integers when both sides are integral.
fn arith(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Result<i64, RuntimeError>,
    float_op: fn(f64, f64) -> Result<f64, RuntimeError>,
) -> OpResult {
    if !is_number(left) || !is_number(right) {
        return Err(unsupported(op, left, right));
    }
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return int_op(a, b).map(Value::Int);
    }
    match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => float_op(a, b).map(Value::Float),
        _ => Err(unsupported(op, left, right)),
    }
}

fn checked(result: Option<i64>) -> Result<i64, RuntimeError> {
    result.ok_or_else(RuntimeError::overflow)
}

fn zero_division(message: &str) -> RuntimeError {
    RuntimeError::ZeroDivision(message.to_string())
}

pub fn floor_div_int(a: i64, b: i64) -> Result<i64, RuntimeError> {
    if b == 0 {
        return Err(zero_division("integer division or modulo by zero"));
    }
    let quotient = checked(a.checked_div(b))?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        checked(quotient.checked_sub(1))
    } else {
        Ok(quotient)
    }
}

pub fn mod_int(a: i64, b: i64) -> Result<i64, RuntimeError> {
    if b == 0 {
        return Err(zero_division("integer modulo by zero"));
    }
    let remainder = checked(a.checked_rem(b))?;
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        Ok(remainder + b)
    } else {
        Ok(remainder)
    }
}

fn mod_float(a: f64, b: f64) -> Result<f64, RuntimeError> {
    if b == 0.0 {
        return Err(zero_division("float modulo"));
    }
    let remainder = a % b;
    if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
        Ok(remainder + b)
    } else {
        Ok(remainder)
    }
}

/// Length of `count` copies of a `unit`-long sequence, refused past `max_len`.
pub fn bounded_len(unit: usize, count: usize, max_len: usize) -> Result<usize, RuntimeError> {
    unit.checked_mul(count)
        .filter(|total| *total <= max_len)
        .ok_or_else(|| {
            RuntimeError::Overflow(format!("result would exceed {max_len} items"))
        })
}

fn repeat_count(count: &Value) -> usize {
    usize::try_from(count.as_int().unwrap_or(0)).unwrap_or(0)
}

fn repeat(items: &[Value], count: usize, max_len: usize) -> Result<Vec<Value>, RuntimeError> {
    let mut repeated = Vec::with_capacity(bounded_len(items.len(), count, max_len)?);
    if items.is_empty() {
        return Ok(repeated);
    }
    for _ in 0..count {
        repeated.extend(items.iter().cloned());
    }
    Ok(repeated)
}

fn add(left: &Value, right: &Value, max_len: usize) -> OpResult {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => {
            bounded_len(1, a.len().saturating_add(b.len()), max_len)?;
            Ok(Value::str(format!("{a}{b}")))
        }
        (Value::List(a), Value::List(b)) => {
            bounded_len(1, a.borrow().len().saturating_add(b.borrow().len()), max_len)?;
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            bounded_len(1, a.len().saturating_add(b.len()), max_len)?;
            Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => arith(
            BinaryOp::Add,
            left,
            right,
            |a, b| checked(a.checked_add(b)),
            |a, b| Ok(a + b),
        ),
    }
}

fn mul(left: &Value, right: &Value, max_len: usize) -> OpResult {
    match (left, right) {
        (Value::Str(text), count) | (count, Value::Str(text)) if count.as_int().is_some() => {
            let count = repeat_count(count);
            bounded_len(text.len(), count, max_len)?;
            Ok(Value::str(text.repeat(count)))
        }
        (Value::List(items), count) | (count, Value::List(items)) if count.as_int().is_some() => {
            let repeated = repeat(&items.borrow(), repeat_count(count), max_len)?;
            Ok(Value::list(repeated))
        }
        (Value::Tuple(items), count) | (count, Value::Tuple(items))
            if count.as_int().is_some() =>
        {
            Ok(Value::tuple(repeat(items, repeat_count(count), max_len)?))
        }
        _ => arith(
            BinaryOp::Mul,
            left,
            right,
            |a, b| checked(a.checked_mul(b)),
            |a, b| Ok(a * b),
        ),
    }
}

fn true_div(left: &Value, right: &Value) -> OpResult {
    match (left.as_float(), right.as_float()) {
        (Some(_), Some(b)) if b == 0.0 && is_number(left) && is_number(right) => {
            Err(zero_division("division by zero"))
        }
        (Some(a), Some(b)) if is_number(left) && is_number(right) => Ok(Value::Float(a / b)),
        _ => Err(unsupported(BinaryOp::Div, left, right)),
    }
}

fn power(left: &Value, right: &Value) -> OpResult {
    if !is_number(left) || !is_number(right) {
        return Err(unsupported(BinaryOp::Pow, left, right));
    }
    if let (Some(base), Some(exp)) = (left.as_int(), right.as_int()) {
        if exp >= 0 {
            let exp = u32::try_from(exp).map_err(|_| RuntimeError::overflow())?;
            return checked(base.checked_pow(exp)).map(Value::Int);
        }
    }
    let base = left.as_float().unwrap_or_default();
    let exp = right.as_float().unwrap_or_default();
    if base == 0.0 && exp < 0.0 {
        return Err(zero_division("0.0 cannot be raised to a negative power"));
    }
    Ok(Value::Float(base.powf(exp)))
}

fn ordering(op: BinaryOp, left: &Value, right: &Value) -> Result<bool, RuntimeError> {
    let both_int = matches!((left, right), (Value::Int(_), Value::Int(_)));
    if is_number(left) && is_number(right) && !both_int {
        let a = left.as_float().unwrap_or(f64::NAN);
        let b = right.as_float().unwrap_or(f64::NAN);
        return Ok(match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Gt => a > b,
            BinaryOp::LtEq => a <= b,
            _ => a >= b,
        });
    }
    let order = left.compare(right).map_err(|_| {
        RuntimeError::Type(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    })?;
    Ok(match op {
        BinaryOp::Lt => order.is_lt(),
        BinaryOp::Gt => order.is_gt(),
        BinaryOp::LtEq => order.is_le(),
        _ => order.is_ge(),
    })
}

/// Evaluates a binary operator on two already evaluated operands. Sequence
/// results longer than `max_len` raise `OverflowError`.
pub fn binary(op: BinaryOp, left: &Value, right: &Value, max_len: usize) -> OpResult {
    match op {
        BinaryOp::Add => add(left, right, max_len),
        BinaryOp::Sub => arith(
            op,
            left,
            right,
            |a, b| checked(a.checked_sub(b)),
            |a, b| Ok(a - b),
        ),
        BinaryOp::Mul => mul(left, right, max_len),
        BinaryOp::Div => true_div(left, right),
        BinaryOp::FloorDiv => arith(op, left, right, floor_div_int, |a, b| {
            if b == 0.0 {
                Err(zero_division("float floor division by zero"))
            } else {
                Ok((a / b).floor())
            }
        }),
        BinaryOp::Mod => arith(op, left, right, mod_int, mod_float),
        BinaryOp::Pow => power(left, right),
        BinaryOp::LShift | BinaryOp::RShift => shift(op, left, right),
        BinaryOp::BitAnd => bitwise(op, left, right, |a, b| a & b),
        BinaryOp::BitXor => bitwise(op, left, right, |a, b| a ^ b),
        BinaryOp::BitOr => bitwise(op, left, right, |a, b| a | b),
        BinaryOp::Eq => Ok(Value::Bool(left.py_eq(right))),
        BinaryOp::Ne => Ok(Value::Bool(!left.py_eq(right))),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
            ordering(op, left, right).map(Value::Bool)
        }
        BinaryOp::In => right.contains(left).map(Value::Bool),
        BinaryOp::NotIn => right.contains(left).map(|found| Value::Bool(!found)),
        BinaryOp::Is => Ok(Value::Bool(left.is_same(right))),
        BinaryOp::IsNot => Ok(Value::Bool(!left.is_same(right))),
        BinaryOp::And => Ok(if left.truthy() { right.clone() } else { left.clone() }),
        BinaryOp::Or => Ok(if left.truthy() { left.clone() } else { right.clone() }),
    }
}

/// `&`, `|` and `^`; two booleans give a boolean.
fn bitwise(op: BinaryOp, left: &Value, right: &Value, apply: fn(i64, i64) -> i64) -> OpResult {
    if let (Value::Bool(a), Value::Bool(b)) = (left, right) {
        return Ok(Value::Bool(apply(i64::from(*a), i64::from(*b)) != 0));
    }
    match (left, right) {
        (Value::Float(_), _) | (_, Value::Float(_)) => Err(unsupported(op, left, right)),
        _ => match (left.as_int(), right.as_int()) {
            (Some(a), Some(b)) => Ok(Value::Int(apply(a, b))),
            _ => Err(unsupported(op, left, right)),
        },
    }
}

fn shift(op: BinaryOp, left: &Value, right: &Value) -> OpResult {
    let (Some(value), Some(count)) = (int_operand(left), int_operand(right)) else {
        return Err(unsupported(op, left, right));
    };
    if count < 0 {
        return Err(RuntimeError::Value("negative shift count".to_string()));
    }
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    let shifted = match op {
        BinaryOp::LShift if value == 0 => 0,
        BinaryOp::LShift => value
            .checked_shl(count)
            .filter(|shifted| shifted.checked_shr(count) == Some(value))
            .ok_or_else(RuntimeError::overflow)?,
        _ => value.checked_shr(count).unwrap_or(if value < 0 { -1 } else { 0 }),
    };
    Ok(Value::Int(shifted))
}

fn int_operand(value: &Value) -> Option<i64> {
    match value {
        Value::Float(_) => None,
        other => other.as_int(),
    }
}

/// `target op= value`; lists are extended in place like the language does.
pub fn augmented(op: BinaryOp, current: Value, operand: &Value, max_len: usize) -> OpResult {
    if let (BinaryOp::Add, Value::List(items)) = (op, &current) {
        let extra = operand.to_vec()?;
        bounded_len(1, items.borrow().len().saturating_add(extra.len()), max_len)?;
        items.borrow_mut().extend(extra);
        return Ok(current);
    }
    binary(op, &current, operand, max_len)
}

pub fn unary(op: UnaryOp, operand: &Value) -> OpResult {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
        UnaryOp::Invert => match int_operand(operand) {
            Some(value) => Ok(Value::Int(!value)),
            None => Err(RuntimeError::Type(format!(
                "bad operand type for unary ~: '{}'",
                operand.type_name()
            ))),
        },
        UnaryOp::Neg => match operand {
            Value::Float(value) => Ok(Value::Float(-value)),
            other => match other.as_int() {
                Some(value) => checked(value.checked_neg()).map(Value::Int),
                None => Err(RuntimeError::Type(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            },
        },
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let adjusted = if index < 0 { index + len } else { index };
    if (0..len).contains(&adjusted) {
        usize::try_from(adjusted).ok()
    } else {
        None
    }
}

fn integer_index(container: &Value, index: &Value) -> Result<i64, RuntimeError> {
    index.as_int().ok_or_else(|| {
        RuntimeError::Type(format!(
            "{} indices must be integers or slices, not {}",
            container.type_name(),
            index.type_name()
        ))
    })
}

/// `container[index]`.
pub fn get_item(container: &Value, index: &Value) -> OpResult {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let position = integer_index(container, index)?;
            normalize_index(position, items.len())
                .map(|slot| items[slot].clone())
                .ok_or_else(|| RuntimeError::Index("list index out of range".to_string()))
        }
        Value::Tuple(items) => {
            let position = integer_index(container, index)?;
            normalize_index(position, items.len())
                .map(|slot| items[slot].clone())
                .ok_or_else(|| RuntimeError::Index("tuple index out of range".to_string()))
        }
        Value::Str(text) => {
            let position = integer_index(container, index)?;
            let len = text.chars().count();
            normalize_index(position, len)
                .and_then(|slot| text.chars().nth(slot))
                .map(|ch| Value::str(ch.to_string()))
                .ok_or_else(|| RuntimeError::Index("string index out of range".to_string()))
        }
        Value::Range(range) => {
            let position = integer_index(container, index)?;
            normalize_index(position, range.len())
                .and_then(|slot| range.get(slot))
                .map(Value::Int)
                .ok_or_else(|| RuntimeError::Index("range object index out of range".to_string()))
        }
        Value::Dict(dict) => dict
            .borrow()
            .get(index)?
            .ok_or_else(|| RuntimeError::Key(index.repr())),
        other => Err(RuntimeError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `container[index] = value`.
pub fn set_item(container: &Value, index: Value, value: Value) -> Result<(), RuntimeError> {
    match container {
        Value::List(items) => {
            let position = integer_index(container, &index)?;
            let mut items = items.borrow_mut();
            let slot = normalize_index(position, items.len()).ok_or_else(|| {
                RuntimeError::Index("list assignment index out of range".to_string())
            })?;
            items[slot] = value;
            Ok(())
        }
        Value::Dict(dict) => dict.borrow_mut().insert(index, value),
        other => Err(RuntimeError::Type(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn slice_bound(value: Option<Value>) -> Result<Option<i64>, RuntimeError> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(value) => value.as_int().map(Some).ok_or_else(|| {
            RuntimeError::Type(
                "slice indices must be integers or None or have an __index__ method".to_string(),
            )
        }),
    }
}

/// Positions selected by `[start:stop:step]` over a sequence of `len` items.
pub fn slice_positions(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, RuntimeError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeError::Value("slice step cannot be zero".to_string()));
    }
    let len = i64::try_from(len).map_err(|_| RuntimeError::overflow())?;
    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let bound = |value: Option<i64>, default: i64| match value {
        None => default,
        Some(value) if value < 0 => (value + len).max(lower),
        Some(value) => value.min(upper),
    };
    let mut position = bound(start, if step > 0 { lower } else { upper });
    let stop = bound(stop, if step > 0 { upper } else { lower });

    let mut positions = Vec::new();
    while (step > 0 && position < stop) || (step < 0 && position > stop) {
        positions.push(usize::try_from(position).map_err(|_| RuntimeError::overflow())?);
        position += step;
    }
    Ok(positions)
}

/// `container[start:stop:step]`.
pub fn slice(
    container: &Value,
    start: Option<Value>,
    stop: Option<Value>,
    step: Option<Value>,
) -> OpResult {
    let (start, stop, step) = (slice_bound(start)?, slice_bound(stop)?, slice_bound(step)?);
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let positions = slice_positions(items.len(), start, stop, step)?;
            Ok(Value::list(positions.into_iter().map(|slot| items[slot].clone()).collect()))
        }
        Value::Tuple(items) => {
            let positions = slice_positions(items.len(), start, stop, step)?;
            Ok(Value::tuple(positions.into_iter().map(|slot| items[slot].clone()).collect()))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let positions = slice_positions(chars.len(), start, stop, step)?;
            Ok(Value::str(positions.into_iter().map(|slot| chars[slot]).collect::<String>()))
        }
        Value::Range(_) => {
            let items = container.to_vec()?;
            let positions = slice_positions(items.len(), start, stop, step)?;
            Ok(Value::list(positions.into_iter().map(|slot| items[slot].clone()).collect()))
        }
        other => Err(RuntimeError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `object.name`: module members and bound methods.
pub fn attribute(object: &Value, name: &str) -> OpResult {
    match object {
        Value::Module(module) => module.attribute(name).ok_or_else(|| {
            RuntimeError::Attribute(format!(
                "module '{}' has no attribute '{name}'",
                module.name
            ))
        }),
        Value::Exception(exception) if name == "args" => {
            Ok(Value::tuple(vec![Value::str(&exception.message)]))
        }
        other if methods::has_method(other, name) => Ok(Value::Method(Rc::new(BoundMethod {
            receiver: other.clone(),
            name: name.to_string(),
        }))),
        other => Err(RuntimeError::Attribute(format!(
            "'{}' object has no attribute '{name}'",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_LEN: usize = 1_000;

    #[test]
    fn floor_division_and_modulo_round_toward_negative_infinity() -> Result<(), RuntimeError> {
        assert_eq!(floor_div_int(-7, 2)?, -4);
        assert_eq!(mod_int(-7, 2)?, 1);
        assert_eq!(mod_int(7, -2)?, -1);
        assert!(matches!(floor_div_int(1, 0), Err(RuntimeError::ZeroDivision(_))));
        Ok(())
    }

    #[test]
    fn integer_overflow_is_reported() {
        let result = binary(BinaryOp::Mul, &Value::Int(i64::MAX), &Value::Int(2), MAX_LEN);
        assert!(matches!(result, Err(RuntimeError::Overflow(_))));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() -> Result<(), RuntimeError> {
        assert_eq!(binary(BinaryOp::Add, &Value::Int(1), &Value::Float(0.5), MAX_LEN)?, Value::Float(1.5));
        assert_eq!(binary(BinaryOp::Div, &Value::Int(1), &Value::Int(4), MAX_LEN)?, Value::Float(0.25));
        assert_eq!(binary(BinaryOp::Pow, &Value::Int(2), &Value::Int(-1), MAX_LEN)?, Value::Float(0.5));
        Ok(())
    }

    #[test]
    fn slices_follow_python_bounds() -> Result<(), RuntimeError> {
        assert_eq!(slice_positions(5, Some(1), None, None)?, vec![1, 2, 3, 4]);
        assert_eq!(slice_positions(5, None, None, Some(-1))?, vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_positions(5, Some(-2), Some(100), None)?, vec![3, 4]);
        assert!(slice_positions(5, None, None, Some(0)).is_err());
        Ok(())
    }

    #[test]
    fn sequences_repeat_and_concatenate() -> Result<(), RuntimeError> {
        assert_eq!(binary(BinaryOp::Mul, &Value::str("ab"), &Value::Int(2), MAX_LEN)?, Value::str("abab"));
        let joined = binary(
            BinaryOp::Add,
            &Value::list(vec![Value::Int(1)]),
            &Value::list(vec![Value::Int(2)]),
            MAX_LEN,
        )?;
        assert_eq!(joined, Value::list(vec![Value::Int(1), Value::Int(2)]));
        Ok(())
    }

    #[test]
    fn oversized_repetition_is_refused_before_allocating() {
        let huge = binary(BinaryOp::Mul, &Value::str("ab"), &Value::Int(i64::MAX), MAX_LEN);
        assert!(matches!(huge, Err(RuntimeError::Overflow(_))));
        let list = Value::list(vec![Value::Int(0); 10]);
        assert!(binary(BinaryOp::Mul, &Value::Int(101), &list, MAX_LEN).is_err());
        assert!(binary(BinaryOp::Mul, &Value::Int(100), &list, MAX_LEN).is_ok());
        assert!(augmented(BinaryOp::Add, Value::list(vec![Value::Int(0); MAX_LEN]), &list, MAX_LEN).is_err());
        assert_eq!(bounded_len(usize::MAX, 2, usize::MAX).ok(), None);
        assert_eq!(
            binary(BinaryOp::Mul, &Value::list(Vec::new()), &Value::Int(i64::MAX), MAX_LEN).ok(),
            Some(Value::list(Vec::new()))
        );
    }

    #[test]
    fn bitwise_operators_follow_integer_semantics() -> Result<(), RuntimeError> {
        let int = Value::Int;
        assert_eq!(binary(BinaryOp::BitAnd, &int(12), &int(10), MAX_LEN)?, int(8));
        assert_eq!(binary(BinaryOp::BitOr, &int(12), &int(3), MAX_LEN)?, int(15));
        assert_eq!(binary(BinaryOp::BitXor, &int(-1), &int(5), MAX_LEN)?, int(-6));
        assert_eq!(
            binary(BinaryOp::BitAnd, &Value::Bool(true), &Value::Bool(false), MAX_LEN)?,
            Value::Bool(false)
        );
        assert_eq!(binary(BinaryOp::LShift, &int(1), &int(62), MAX_LEN)?, int(1 << 62));
        assert_eq!(binary(BinaryOp::RShift, &int(-9), &int(1), MAX_LEN)?, int(-5));
        assert_eq!(binary(BinaryOp::RShift, &int(-9), &int(500), MAX_LEN)?, int(-1));
        assert_eq!(binary(BinaryOp::LShift, &int(0), &int(500), MAX_LEN)?, int(0));
        assert_eq!(unary(UnaryOp::Invert, &int(5))?, int(-6));
        Ok(())
    }

    #[test]
    fn shifts_are_checked() {
        let int = Value::Int;
        assert!(matches!(
            binary(BinaryOp::LShift, &int(1), &int(63), MAX_LEN),
            Err(RuntimeError::Overflow(_))
        ));
        assert!(matches!(
            binary(BinaryOp::LShift, &int(3), &int(9_000_000_000), MAX_LEN),
            Err(RuntimeError::Overflow(_))
        ));
        assert_eq!(
            binary(BinaryOp::RShift, &int(1), &int(-1), MAX_LEN),
            Err(RuntimeError::Value("negative shift count".to_string()))
        );
        assert!(matches!(
            binary(BinaryOp::BitOr, &Value::Float(1.0), &int(1), MAX_LEN),
            Err(RuntimeError::Type(_))
        ));
        assert!(matches!(unary(UnaryOp::Invert, &Value::Float(1.0)), Err(RuntimeError::Type(_))));
    }
}
