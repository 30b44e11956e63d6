use std::collections::HashMap;
use std::rc::Rc;

use super::builtins::{arity, expect_float, expect_int, no_kwargs, Builtin, BuiltinFn};
use super::error::RuntimeError;
use super::interpreter::Interpreter;
use super::value::{NativeModule, Value};

/// Modules generated code may import. Everything else is refused.
pub const ALLOWED_MODULES: &[&str] = &["math", "typing", "__future__"];

pub fn import(name: &str) -> Result<Rc<NativeModule>, RuntimeError> {
    let module = match name {
        "math" => math_module(),
        "typing" | "__future__" => NativeModule {
            name: if name == "typing" { "typing" } else { "__future__" },
            members: HashMap::new(),
            permissive: true,
        },
        other => {
            return Err(RuntimeError::Import(format!(
                "import of module '{other}' is not allowed (allowed: {})",
                ALLOWED_MODULES.join(", ")
            )));
        }
    };
    Ok(Rc::new(module))
}

fn domain_error() -> RuntimeError {
    RuntimeError::Value("math domain error".to_string())
}

fn unary_float(
    name: &'static str,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<f64, RuntimeError> {
    no_kwargs(name, kwargs)?;
    arity(name, args, 1, 1)?;
    expect_float(name, &args[0])
}

fn float_to_int(value: f64) -> Result<Value, RuntimeError> {
    if !value.is_finite() {
        return Err(RuntimeError::Overflow(
            "cannot convert float infinity to integer".to_string(),
        ));
    }
    if value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(RuntimeError::overflow());
    }
    Ok(Value::Int(value as i64))
}

fn math_sqrt(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    let value = unary_float("sqrt", &args, &kwargs)?;
    if value < 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(value.sqrt()))
}

fn math_floor(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    if let Some(value) = args.first().and_then(|value| match value {
        Value::Int(value) => Some(*value),
        _ => None,
    }) {
        return Ok(Value::Int(value));
    }
    float_to_int(unary_float("floor", &args, &kwargs)?.floor())
}

fn math_ceil(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    if let Some(Value::Int(value)) = args.first() {
        return Ok(Value::Int(*value));
    }
    float_to_int(unary_float("ceil", &args, &kwargs)?.ceil())
}

fn math_trunc(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    if let Some(Value::Int(value)) = args.first() {
        return Ok(Value::Int(*value));
    }
    float_to_int(unary_float("trunc", &args, &kwargs)?.trunc())
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    i64::try_from(a).unwrap_or(i64::MAX)
}

fn math_gcd(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("gcd", &kwargs)?;
    let mut result = 0;
    for value in &args {
        result = gcd(result, expect_int("gcd", value)?);
    }
    Ok(Value::Int(result))
}

fn math_isqrt(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("isqrt", &kwargs)?;
    arity("isqrt", &args, 1, 1)?;
    let value = expect_int("isqrt", &args[0])?;
    if value < 0 {
        return Err(RuntimeError::Value(
            "isqrt() argument must be nonnegative".to_string(),
        ));
    }
    let mut root = (value as f64).sqrt() as i64;
    while root.checked_mul(root).is_none_or(|square| square > value) {
        root -= 1;
    }
    while (root + 1).checked_mul(root + 1).is_some_and(|square| square <= value) {
        root += 1;
    }
    Ok(Value::Int(root))
}

fn math_factorial(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("factorial", &kwargs)?;
    arity("factorial", &args, 1, 1)?;
    let value = expect_int("factorial", &args[0])?;
    if value < 0 {
        return Err(RuntimeError::Value(
            "factorial() not defined for negative values".to_string(),
        ));
    }
    (1..=value)
        .try_fold(1i64, |acc, factor| acc.checked_mul(factor))
        .map(Value::Int)
        .ok_or_else(RuntimeError::overflow)
}

fn math_comb(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("comb", &kwargs)?;
    arity("comb", &args, 2, 2)?;
    let n = expect_int("comb", &args[0])?;
    let k = expect_int("comb", &args[1])?;
    if n < 0 || k < 0 {
        return Err(RuntimeError::Value(
            "comb() arguments must be non-negative".to_string(),
        ));
    }
    if k > n {
        return Ok(Value::Int(0));
    }
    let k = k.min(n - k);
    let mut result: i128 = 1;
    for step in 0..k {
        result = result * i128::from(n - step) / i128::from(step + 1);
        if result > i128::from(i64::MAX) {
            return Err(RuntimeError::overflow());
        }
    }
    i64::try_from(result).map(Value::Int).map_err(|_| RuntimeError::overflow())
}

fn math_fabs(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    Ok(Value::Float(unary_float("fabs", &args, &kwargs)?.abs()))
}

fn math_pow(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("pow", &kwargs)?;
    arity("pow", &args, 2, 2)?;
    let base = expect_float("pow", &args[0])?;
    let exp = expect_float("pow", &args[1])?;
    if base == 0.0 && exp < 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(base.powf(exp)))
}

fn math_log(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    no_kwargs("log", &kwargs)?;
    arity("log", &args, 1, 2)?;
    let value = expect_float("log", &args[0])?;
    if value <= 0.0 {
        return Err(domain_error());
    }
    match args.get(1) {
        Some(base) => {
            let base = expect_float("log", base)?;
            if base <= 0.0 || base == 1.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(value.ln() / base.ln()))
        }
        None => Ok(Value::Float(value.ln())),
    }
}

fn math_log2(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    let value = unary_float("log2", &args, &kwargs)?;
    if value <= 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(value.log2()))
}

fn math_log10(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    let value = unary_float("log10", &args, &kwargs)?;
    if value <= 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(value.log10()))
}

fn math_exp(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    Ok(Value::Float(unary_float("exp", &args, &kwargs)?.exp()))
}

fn math_sin(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    Ok(Value::Float(unary_float("sin", &args, &kwargs)?.sin()))
}

fn math_cos(
    _: &mut Interpreter,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    Ok(Value::Float(unary_float("cos", &args, &kwargs)?.cos()))
}

fn math_isclose(
    _: &mut Interpreter,
    args: Vec<Value>,
    mut kwargs: Vec<(String, Value)>,
) -> Result<Value, RuntimeError> {
    let rel_tol = super::builtins::take_kwarg(&mut kwargs, "rel_tol");
    let abs_tol = super::builtins::take_kwarg(&mut kwargs, "abs_tol");
    no_kwargs("isclose", &kwargs)?;
    arity("isclose", &args, 2, 2)?;
    let a = expect_float("isclose", &args[0])?;
    let b = expect_float("isclose", &args[1])?;
    let rel_tol = rel_tol.map(|tol| expect_float("isclose", &tol)).transpose()?.unwrap_or(1e-9);
    let abs_tol = abs_tol.map(|tol| expect_float("isclose", &tol)).transpose()?.unwrap_or(0.0);
    let close = a == b || (a - b).abs() <= (rel_tol * a.abs().max(b.abs())).max(abs_tol);
    Ok(Value::Bool(close))
}

fn math_module() -> NativeModule {
    let functions: &[(&'static str, BuiltinFn)] = &[
        ("sqrt", math_sqrt),
        ("floor", math_floor),
        ("ceil", math_ceil),
        ("trunc", math_trunc),
        ("gcd", math_gcd),
        ("isqrt", math_isqrt),
        ("factorial", math_factorial),
        ("comb", math_comb),
        ("fabs", math_fabs),
        ("pow", math_pow),
        ("log", math_log),
        ("log2", math_log2),
        ("log10", math_log10),
        ("exp", math_exp),
        ("sin", math_sin),
        ("cos", math_cos),
        ("isclose", math_isclose),
    ];

    let mut members: HashMap<&'static str, Value> = functions
        .iter()
        .map(|&(name, func)| (name, Value::Builtin(Builtin::function(name, func))))
        .collect();
    members.insert("pi", Value::Float(std::f64::consts::PI));
    members.insert("e", Value::Float(std::f64::consts::E));
    members.insert("tau", Value::Float(std::f64::consts::TAU));
    members.insert("inf", Value::Float(f64::INFINITY));
    members.insert("nan", Value::Float(f64::NAN));

    NativeModule {
        name: "math",
        members,
        permissive: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_allow_listed_modules_import() {
        assert!(import("math").is_ok());
        assert!(import("typing").is_ok());
        assert!(matches!(import("os"), Err(RuntimeError::Import(_))));
    }

    #[test]
    fn typing_resolves_any_name() -> Result<(), RuntimeError> {
        let typing = import("typing")?;
        assert_eq!(typing.attribute("List"), Some(Value::None));
        let math = import("math")?;
        assert!(math.attribute("nope").is_none());
        Ok(())
    }

    #[test]
    fn integer_helpers() {
        assert_eq!(gcd(12, -18), 6);
        assert_eq!(gcd(0, 5), 5);
    }
}
