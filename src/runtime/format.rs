use super::error::RuntimeError;
use super::ops::bounded_len;
use super::value::Value;

/// A parsed `[[fill]align][sign][0][width][,][.precision][type]` spec.
#[derive(Debug, Default, PartialEq)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn invalid(spec: &str) -> RuntimeError {
    RuntimeError::Value(format!("Invalid format specifier '{spec}'"))
}

fn parse_spec(spec: &str) -> Result<FormatSpec, RuntimeError> {
    let chars: Vec<char> = spec.chars().collect();
    let mut parsed = FormatSpec::default();
    let mut pos = 0;

    let is_align = |ch: char| matches!(ch, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = Some(chars[0]);
        parsed.align = Some(chars[1]);
        pos = 2;
    } else if chars.first().copied().is_some_and(is_align) {
        parsed.align = Some(chars[0]);
        pos = 1;
    }

    if let Some(&sign @ ('+' | '-' | ' ')) = chars.get(pos) {
        parsed.sign = Some(sign);
        pos += 1;
    }
    if chars.get(pos) == Some(&'0') {
        parsed.zero = true;
        pos += 1;
    }

    let width_start = pos;
    while chars.get(pos).is_some_and(char::is_ascii_digit) {
        pos += 1;
    }
    if pos > width_start {
        let digits: String = chars[width_start..pos].iter().collect();
        parsed.width = digits.parse().map_err(|_| invalid(spec))?;
    }

    if let Some(&group @ (',' | '_')) = chars.get(pos) {
        parsed.grouping = Some(group);
        pos += 1;
    }

    if chars.get(pos) == Some(&'.') {
        pos += 1;
        let precision_start = pos;
        while chars.get(pos).is_some_and(char::is_ascii_digit) {
            pos += 1;
        }
        if pos == precision_start {
            return Err(invalid(spec));
        }
        let digits: String = chars[precision_start..pos].iter().collect();
        parsed.precision = Some(digits.parse().map_err(|_| invalid(spec))?);
    }

    if let Some(&kind) = chars.get(pos) {
        parsed.kind = Some(kind);
        pos += 1;
    }

    if pos != chars.len() {
        return Err(invalid(spec));
    }
    Ok(parsed)
}

/// Python `format(value, spec)`. Widths and precisions past `max_len` raise
/// `OverflowError`.
pub fn format_value(value: &Value, spec: &str, max_len: usize) -> Result<String, RuntimeError> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let parsed = parse_spec(spec)?;
    bounded_len(1, parsed.width, max_len)?;
    bounded_len(1, parsed.precision.unwrap_or_default(), max_len)?;

    match value {
        Value::Int(_) | Value::Bool(_) if !matches!(parsed.kind, Some('s')) => {
            let number = value.as_int().unwrap_or_default();
            format_int(number, &parsed)
        }
        Value::Float(number) => format_float(*number, &parsed),
        Value::Str(text) => {
            if parsed.kind.is_some_and(|kind| kind != 's') {
                return Err(unknown_code(&parsed, value));
            }
            let truncated: String = match parsed.precision {
                Some(limit) => text.chars().take(limit).collect(),
                None => text.to_string(),
            };
            Ok(pad(String::new(), truncated, &parsed, '<'))
        }
        other if parsed.kind.is_none() => Ok(pad(String::new(), other.to_string(), &parsed, '<')),
        other => Err(unknown_code(&parsed, other)),
    }
}

fn unknown_code(spec: &FormatSpec, value: &Value) -> RuntimeError {
    RuntimeError::Value(format!(
        "Unknown format code '{}' for object of type '{}'",
        spec.kind.unwrap_or(' '),
        value.type_name()
    ))
}

fn sign_prefix(negative: bool, spec: &FormatSpec) -> String {
    match (negative, spec.sign) {
        (true, _) => "-".to_string(),
        (false, Some('+')) => "+".to_string(),
        (false, Some(' ')) => " ".to_string(),
        _ => String::new(),
    }
}

fn format_int(number: i64, spec: &FormatSpec) -> Result<String, RuntimeError> {
    let magnitude = number.unsigned_abs();
    let digits = match spec.kind {
        None | Some('d') | Some('n') => group(&magnitude.to_string(), spec.grouping),
        Some('x') => format!("{magnitude:x}"),
        Some('X') => format!("{magnitude:X}"),
        Some('o') => format!("{magnitude:o}"),
        Some('b') => format!("{magnitude:b}"),
        Some('c') => char::from_u32(u32::try_from(number).unwrap_or(u32::MAX))
            .map(String::from)
            .ok_or_else(|| RuntimeError::Overflow("%c arg not in range(0x110000)".to_string()))?,
        Some('f' | 'F' | 'e' | 'E' | 'g' | 'G' | '%') => return format_float(number as f64, spec),
        Some(_) => return Err(unknown_code(spec, &Value::Int(number))),
    };
    if spec.precision.is_some() {
        return Err(RuntimeError::Value(
            "Precision not allowed in integer format specifier".to_string(),
        ));
    }
    Ok(pad(sign_prefix(number < 0, spec), digits, spec, '>'))
}

fn format_float(number: f64, spec: &FormatSpec) -> Result<String, RuntimeError> {
    let negative = number.is_sign_negative() && number != 0.0;
    let magnitude = number.abs();

    let body = if !magnitude.is_finite() {
        if magnitude.is_nan() { "nan" } else { "inf" }.to_string()
    } else {
        match spec.kind {
            None => match spec.precision {
                Some(precision) => general(magnitude, precision.max(1), false),
                None => Value::Float(magnitude).to_string(),
            },
            Some('f' | 'F') => fixed(magnitude, spec.precision.unwrap_or(6), spec.grouping),
            Some('e' | 'E') => exponent(magnitude, spec.precision.unwrap_or(6)),
            Some('g' | 'G') => general(magnitude, spec.precision.unwrap_or(6).max(1), true),
            Some('%') => format!(
                "{}%",
                fixed(magnitude * 100.0, spec.precision.unwrap_or(6), spec.grouping)
            ),
            Some(_) => return Err(unknown_code(spec, &Value::Float(number))),
        }
    };
    let body = if matches!(spec.kind, Some('E' | 'G' | 'F')) {
        body.to_uppercase()
    } else {
        body
    };
    Ok(pad(sign_prefix(negative, spec), body, spec, '>'))
}

fn fixed(magnitude: f64, precision: usize, grouping: Option<char>) -> String {
    let rendered = format!("{magnitude:.precision$}");
    match rendered.split_once('.') {
        Some((whole, fraction)) => format!("{}.{fraction}", group(whole, grouping)),
        None => group(&rendered, grouping),
    }
}

/// Scientific notation with a signed, two digit exponent (`1.50e+03`).
fn exponent(magnitude: f64, precision: usize) -> String {
    let rendered = format!("{magnitude:.precision$e}");
    let Some((mantissa, exp)) = rendered.split_once('e') else {
        return rendered;
    };
    let exp: i32 = exp.parse().unwrap_or_default();
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exp.abs())
}

/// `g` formatting; without an explicit type code the fixed form keeps one
/// fractional digit.
fn general(magnitude: f64, precision: usize, explicit: bool) -> String {
    let rendered = if magnitude == 0.0 {
        "0".to_string()
    } else {
        general_nonzero(magnitude, precision)
    };
    if !explicit && !rendered.contains(['.', 'e']) {
        format!("{rendered}.0")
    } else {
        rendered
    }
}

fn general_nonzero(magnitude: f64, precision: usize) -> String {
    let exp = magnitude.log10().floor() as i32;
    let precision_i32 = i32::try_from(precision).unwrap_or(i32::MAX);
    if exp < -4 || exp >= precision_i32 {
        let text = exponent(magnitude, precision - 1);
        match text.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{exp}", trim_fraction(mantissa)),
            None => text,
        }
    } else {
        let decimals = usize::try_from(precision_i32 - 1 - exp).unwrap_or(0);
        trim_fraction(&format!("{magnitude:.decimals$}")).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn group(digits: &str, separator: Option<char>) -> String {
    let Some(separator) = separator else {
        return digits.to_string();
    };
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(ch);
    }
    grouped
}

fn pad(prefix: String, body: String, spec: &FormatSpec, default_align: char) -> String {
    let (fill, align) = match (spec.zero, spec.fill, spec.align) {
        (true, None, None) => ('0', '='),
        (_, fill, align) => (fill.unwrap_or(' '), align.unwrap_or(default_align)),
    };
    let length = prefix.chars().count() + body.chars().count();
    if length >= spec.width {
        return prefix + &body;
    }
    let padding = spec.width - length;
    let fill_str = |count: usize| fill.to_string().repeat(count);
    match align {
        '<' => format!("{prefix}{body}{}", fill_str(padding)),
        '^' => format!(
            "{}{prefix}{body}{}",
            fill_str(padding / 2),
            fill_str(padding - padding / 2)
        ),
        '=' => format!("{prefix}{}{body}", fill_str(padding)),
        _ => format!("{}{prefix}{body}", fill_str(padding)),
    }
}

/// `str.format`: positional `{}` / `{0}` and named `{name}` fields with an
/// optional `!r`/`!s` conversion and format spec.
pub fn format_template(
    template: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
    max_len: usize,
) -> Result<String, RuntimeError> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    field.push(next);
                }
                if !closed {
                    return Err(RuntimeError::Value(
                        "expected '}' before end of string".to_string(),
                    ));
                }

                let (head, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let (name, conversion) = match head.split_once('!') {
                    Some((name, conversion)) => (name, Some(conversion)),
                    None => (head, None),
                };

                let value = if name.is_empty() {
                    let value = args.get(auto_index).cloned();
                    auto_index += 1;
                    value.ok_or_else(|| {
                        RuntimeError::Index(format!(
                            "Replacement index {} out of range for positional args tuple",
                            auto_index - 1
                        ))
                    })?
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).cloned().ok_or_else(|| {
                        RuntimeError::Index(format!(
                            "Replacement index {index} out of range for positional args tuple"
                        ))
                    })?
                } else {
                    kwargs
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| RuntimeError::Key(format!("'{name}'")))?
                };

                let value = match conversion {
                    Some("r") => Value::str(value.repr()),
                    Some("s") => Value::str(value.to_string()),
                    Some(other) => {
                        return Err(RuntimeError::Value(format!(
                            "Unknown conversion specifier {other}"
                        )));
                    }
                    None => value,
                };
                output.push_str(&format_value(&value, spec, max_len)?);
            }
            '}' => {
                return Err(RuntimeError::Value(
                    "Single '}' encountered in format string".to_string(),
                ));
            }
            other => output.push(other),
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_LEN: usize = 1_000;

    #[test]
    fn formats_numbers() -> Result<(), RuntimeError> {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f", MAX_LEN)?, "3.14");
        assert_eq!(format_value(&Value::Int(42), ">5", MAX_LEN)?, "   42");
        assert_eq!(format_value(&Value::Int(-42), "05", MAX_LEN)?, "-0042");
        assert_eq!(format_value(&Value::Int(1234567), ",", MAX_LEN)?, "1,234,567");
        assert_eq!(format_value(&Value::Float(0.25), ".1%", MAX_LEN)?, "25.0%");
        assert_eq!(format_value(&Value::Float(1500.0), ".2e", MAX_LEN)?, "1.50e+03");
        assert_eq!(format_value(&Value::Int(255), "x", MAX_LEN)?, "ff");
        Ok(())
    }

    #[test]
    fn formats_strings() -> Result<(), RuntimeError> {
        assert_eq!(format_value(&Value::str("ab"), "*^6", MAX_LEN)?, "**ab**");
        assert_eq!(format_value(&Value::str("abcdef"), ".3", MAX_LEN)?, "abc");
        assert!(format_value(&Value::str("ab"), "d", MAX_LEN).is_err());
        Ok(())
    }

    #[test]
    fn template_fields() -> Result<(), RuntimeError> {
        let args = [Value::Int(1), Value::str("x")];
        let kwargs = [("name".to_string(), Value::str("bob"))];
        assert_eq!(
            format_template("{} {!r} {name:>4} {{}}", &args, &kwargs, MAX_LEN)?,
            "1 'x'  bob {}"
        );
        assert_eq!(format_template("{1}{0}", &args, &[], MAX_LEN)?, "x1");
        Ok(())
    }

    #[test]
    fn oversized_widths_are_refused() {
        let wide = format_value(&Value::Int(1), ">1001", MAX_LEN);
        assert!(matches!(wide, Err(RuntimeError::Overflow(_))));
        let precise = format_value(&Value::Float(1.0), ".5000f", MAX_LEN);
        assert!(matches!(precise, Err(RuntimeError::Overflow(_))));
        assert!(format_template("{:>2000}", &[Value::Int(1)], &[], MAX_LEN).is_err());
    }
}
