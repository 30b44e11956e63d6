use std::iter::Peekable;
use std::str::Chars;

use crate::ast::nodes::{Arg, Expr, FStringPart, Literal};
use crate::lexer::tokenize;

use super::grammar::parse_expression;

/// Splits the body of an f-string into literal text and `{expr[!conv][:spec]}` fields.
///
/// Returns `None` when a field is unterminated or its expression does not parse.
pub(super) fn parse_fstring(content: &str) -> Option<Expr> {
    let mut parts = Vec::new();
    let mut current_text = String::new();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                current_text.push('{');
            }
            '{' => {
                if !current_text.is_empty() {
                    parts.push(FStringPart::Text(std::mem::take(&mut current_text)));
                }
                let field = read_field(&mut chars)?;
                parts.push(field_part(&field)?);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                current_text.push('}');
            }
            _ => current_text.push(ch),
        }
    }

    if parts.is_empty() {
        return Some(Expr::Literal(Literal::String(current_text)));
    }
    if !current_text.is_empty() {
        parts.push(FStringPart::Text(current_text));
    }
    Some(Expr::FString { parts })
}

fn read_field(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut field = String::new();

    for ch in chars.by_ref() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            field.push(ch);
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth == 0 => return Some(field),
            '}' => depth -= 1,
            _ => {}
        }
        field.push(ch);
    }
    None
}

/// Finds the format spec separator: the first `:` outside brackets and quotes.
fn split_format_spec(field: &str) -> (&str, Option<String>) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, ch) in field.char_indices() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return (&field[..idx], Some(field[idx + 1..].to_string())),
            _ => {}
        }
    }
    (field, None)
}

fn field_part(field: &str) -> Option<FStringPart> {
    let (expr_text, spec) = split_format_spec(field);
    let expr_text = expr_text.trim();
    let (expr_text, conversion) = if let Some(head) = expr_text.strip_suffix("!r") {
        (head, Some("repr"))
    } else if let Some(head) = expr_text.strip_suffix("!s") {
        (head, Some("str"))
    } else {
        (expr_text, None)
    };

    let tokens = tokenize(expr_text.trim()).ok()?;
    let mut expr = parse_expression(&tokens).ok()?;
    if let Some(func) = conversion {
        expr = Expr::Call {
            func: Box::new(Expr::Identifier(func.to_string())),
            args: vec![Arg::Positional(expr)],
        };
    }
    Some(FStringPart::Expr {
        expr: Box::new(expr),
        spec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_becomes_string_literal() {
        assert_eq!(
            parse_fstring("a {{b}}"),
            Some(Expr::Literal(Literal::String("a {b}".to_string())))
        );
    }

    #[test]
    fn fields_keep_format_spec() {
        let Some(Expr::FString { parts }) = parse_fstring("x={x:>4} y={d['k']}") else {
            panic!("expected f-string");
        };
        assert_eq!(parts.len(), 4);
        assert_eq!(
            parts[1],
            FStringPart::Expr {
                expr: Box::new(Expr::Identifier("x".to_string())),
                spec: Some(">4".to_string()),
            }
        );
        assert!(matches!(&parts[3], FStringPart::Expr { spec: None, .. }));
    }

    #[test]
    fn conversion_wraps_in_call() {
        let Some(Expr::FString { parts }) = parse_fstring("{name!r}") else {
            panic!("expected f-string");
        };
        let FStringPart::Expr { expr, .. } = &parts[0] else {
            panic!("expected field");
        };
        assert!(matches!(expr.as_ref(), Expr::Call { func, .. } if **func == Expr::Identifier("repr".to_string())));
    }

    #[test]
    fn unterminated_field_is_rejected() {
        assert_eq!(parse_fstring("{oops"), None);
    }
}
