use super::token::{Span, Token, TokenKind};
use crate::utils::errors::{Diagnostic, DiagnosticSeverity};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexerError {
    #[error("tabs are not allowed for indentation (line {line}, column {column})")]
    TabsNotAllowed {
        line: usize,
        column: usize,
        span: Span,
    },
    #[error("indentation mismatch: expected {expected} spaces, found {found} (line {line})")]
    IndentationMismatch {
        line: usize,
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("unterminated string literal (line {line}, column {column})")]
    UnterminatedString {
        line: usize,
        column: usize,
        span: Span,
    },
    #[error("unexpected character `{ch}` (line {line}, column {column})")]
    UnexpectedCharacter {
        ch: char,
        line: usize,
        column: usize,
        span: Span,
    },
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            LexerError::TabsNotAllowed { span, .. }
            | LexerError::IndentationMismatch { span, .. }
            | LexerError::UnterminatedString { span, .. }
            | LexerError::UnexpectedCharacter { span, .. } => *span,
        }
    }

    pub fn to_diagnostic(&self, source_id: &str) -> Diagnostic {
        Diagnostic::new(
            DiagnosticSeverity::Error,
            source_id,
            self.span(),
            self.to_string(),
        )
    }
}

pub type LexResult<T> = Result<T, Vec<LexerError>>;

pub fn tokenize(source: &str) -> LexResult<Vec<Token>> {
    let mut lexer = Lexer::new(source);
    lexer.run();
    lexer.finish()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
    depth: usize,
    indent_stack: Vec<usize>,
    tokens: Vec<Token>,
    errors: Vec<LexerError>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            depth: 0,
            indent_stack: vec![0],
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(&mut self) {
        let mut at_line_start = true;

        while self.pos < self.bytes.len() {
            if at_line_start && self.depth == 0 {
                if self.indentation() {
                    at_line_start = false;
                }
                continue;
            }

            let start = self.pos;
            match self.bytes[self.pos] {
                b'\n' => {
                    if self.depth == 0 {
                        self.push(TokenKind::Newline, start, start + 1);
                        at_line_start = true;
                    }
                    self.advance_line();
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'#' => self.skip_comment(),
                b'\\' if self.peek_at(1) == Some(b'\n') => {
                    self.pos += 1;
                    self.advance_line();
                }
                b'(' => self.open(TokenKind::LParen),
                b'[' => self.open(TokenKind::LBracket),
                b'{' => self.open(TokenKind::LBrace),
                b')' => self.close(TokenKind::RParen),
                b']' => self.close(TokenKind::RBracket),
                b'}' => self.close(TokenKind::RBrace),
                b',' => self.op(TokenKind::Comma, 1),
                b':' => self.op(TokenKind::Colon, 1),
                b'|' => self.op(TokenKind::Pipe, 1),
                b'%' => self.op(TokenKind::Percent, 1),
                b'&' => self.op(TokenKind::Amp, 1),
                b'^' => self.op(TokenKind::Caret, 1),
                b'~' => self.op(TokenKind::Tilde, 1),
                b'+' => match self.peek_at(1) {
                    Some(b'=') => self.op(TokenKind::PlusEq, 2),
                    _ => self.op(TokenKind::Plus, 1),
                },
                b'-' => match self.peek_at(1) {
                    Some(b'>') => self.op(TokenKind::Arrow, 2),
                    Some(b'=') => self.op(TokenKind::MinusEq, 2),
                    _ => self.op(TokenKind::Minus, 1),
                },
                b'*' => match self.peek_at(1) {
                    Some(b'*') => self.op(TokenKind::DoubleStar, 2),
                    Some(b'=') => self.op(TokenKind::StarEq, 2),
                    _ => self.op(TokenKind::Star, 1),
                },
                b'/' => match self.peek_at(1) {
                    Some(b'/') => self.op(TokenKind::DoubleSlash, 2),
                    Some(b'=') => self.op(TokenKind::SlashEq, 2),
                    _ => self.op(TokenKind::Slash, 1),
                },
                b'=' => match self.peek_at(1) {
                    Some(b'=') => self.op(TokenKind::EqEq, 2),
                    _ => self.op(TokenKind::Equals, 1),
                },
                b'<' => match self.peek_at(1) {
                    Some(b'=') => self.op(TokenKind::LtEq, 2),
                    Some(b'<') => self.op(TokenKind::LShift, 2),
                    _ => self.op(TokenKind::Lt, 1),
                },
                b'>' => match self.peek_at(1) {
                    Some(b'=') => self.op(TokenKind::GtEq, 2),
                    Some(b'>') => self.op(TokenKind::RShift, 2),
                    _ => self.op(TokenKind::Gt, 1),
                },
                b'!' if self.peek_at(1) == Some(b'=') => self.op(TokenKind::Neq, 2),
                b'.' => {
                    if self.peek_at(1) == Some(b'.') && self.peek_at(2) == Some(b'.') {
                        self.op(TokenKind::Ellipsis, 3);
                    } else if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
                        self.number();
                    } else {
                        self.op(TokenKind::Dot, 1);
                    }
                }
                b'"' | b'\'' => self.string(start, false, false),
                ch if ch.is_ascii_digit() => self.number(),
                ch if ch.is_ascii_alphabetic() || ch == b'_' => self.word(),
                _ => {
                    let ch = self.current_char();
                    let width = ch.len_utf8();
                    self.errors.push(LexerError::UnexpectedCharacter {
                        ch,
                        line: self.line,
                        column: self.column(start),
                        span: Span::new(start, start + width),
                    });
                    self.pos += width;
                }
            }
        }
    }

    /// Reads the indentation of the line starting at `pos`. Blank and comment-only lines are
    /// consumed whole and report `false`.
    fn indentation(&mut self) -> bool {
        let mut width = 0usize;
        while let Some(byte) = self.peek_at(0) {
            match byte {
                b' ' => {
                    width += 1;
                    self.pos += 1;
                }
                b'\t' => {
                    self.errors.push(LexerError::TabsNotAllowed {
                        line: self.line,
                        column: self.column(self.pos),
                        span: Span::new(self.pos, self.pos + 1),
                    });
                    width += 1;
                    self.pos += 1;
                }
                b'\r' => self.pos += 1,
                _ => break,
            }
        }

        match self.peek_at(0) {
            None => return false,
            Some(b'\n') => {
                self.advance_line();
                return false;
            }
            Some(b'#') => {
                self.skip_comment();
                if self.peek_at(0) == Some(b'\n') {
                    self.advance_line();
                }
                return false;
            }
            Some(_) => {}
        }

        let line_offset = self.line_start;
        let last_indent = self.current_indent();
        if width > last_indent {
            self.indent_stack.push(width);
            self.push(
                TokenKind::Indent,
                line_offset + last_indent,
                line_offset + width,
            );
        } else if width < last_indent {
            while width < self.current_indent() {
                let top = self.indent_stack.pop().unwrap_or_default();
                self.push(TokenKind::Dedent, line_offset + width, line_offset + top);
            }
            if width != self.current_indent() {
                self.errors.push(LexerError::IndentationMismatch {
                    line: self.line,
                    expected: self.current_indent(),
                    found: width,
                    span: Span::new(line_offset + width, line_offset + width + 1),
                });
            }
        }
        true
    }

    fn word(&mut self) {
        let start = self.pos;
        while self
            .peek_at(0)
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        let value = &self.source[start..self.pos];

        if matches!(self.peek_at(0), Some(b'"' | b'\'')) {
            let lower = value.to_ascii_lowercase();
            if matches!(lower.as_str(), "r" | "f" | "rf" | "fr") {
                let raw = lower.contains('r');
                let fstring = lower.contains('f');
                self.string(start, raw, fstring);
                return;
            }
        }

        let kind =
            TokenKind::keyword(value).unwrap_or_else(|| TokenKind::Identifier(value.to_string()));
        self.push(kind, start, self.pos);
    }

    fn number(&mut self) {
        let start = self.pos;
        self.digits();
        if self.peek_at(0) == Some(b'.')
            && !self
                .peek_at(1)
                .is_some_and(|b| b == b'.' || b.is_ascii_alphabetic() || b == b'_')
        {
            self.pos += 1;
            self.digits();
        }
        if matches!(self.peek_at(0), Some(b'e' | b'E')) {
            let signed = matches!(self.peek_at(1), Some(b'+' | b'-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += digit_at;
                self.digits();
            }
        }
        let value = self.source[start..self.pos].to_string();
        self.push(TokenKind::Number(value), start, self.pos);
    }

    fn digits(&mut self) {
        while self
            .peek_at(0)
            .is_some_and(|b| b.is_ascii_digit() || b == b'_')
        {
            self.pos += 1;
        }
    }

    /// Scans a string literal whose opening quote is at `pos`. `start` includes any prefix.
    fn string(&mut self, start: usize, raw: bool, fstring: bool) {
        let quote = self.bytes[self.pos];
        let line = self.line;
        let column = self.column(start);
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut value = String::new();
        loop {
            let Some(byte) = self.peek_at(0) else {
                self.errors.push(LexerError::UnterminatedString {
                    line,
                    column,
                    span: Span::new(start, self.pos),
                });
                return;
            };

            if byte == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }

            match byte {
                b'\n' if !triple => {
                    self.errors.push(LexerError::UnterminatedString {
                        line,
                        column,
                        span: Span::new(start, self.pos),
                    });
                    return;
                }
                b'\n' => {
                    value.push('\n');
                    self.advance_line();
                }
                b'\\' if raw => {
                    value.push('\\');
                    self.pos += 1;
                    if self.peek_at(0).is_some_and(|b| b == quote || b == b'\\') {
                        value.push(self.bytes[self.pos] as char);
                        self.pos += 1;
                    }
                }
                b'\\' => self.escape(&mut value),
                _ => {
                    let ch = self.current_char();
                    value.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }

        let kind = if fstring {
            TokenKind::FString(value)
        } else {
            TokenKind::StringLiteral(value)
        };
        self.push(kind, start, self.pos);
    }

    fn escape(&mut self, value: &mut String) {
        let escaped = match self.peek_at(1) {
            Some(b'n') => '\n',
            Some(b't') => '\t',
            Some(b'r') => '\r',
            Some(b'0') => '\0',
            Some(b'\\') => '\\',
            Some(b'\'') => '\'',
            Some(b'"') => '"',
            Some(b'\n') => {
                self.pos += 1;
                self.advance_line();
                return;
            }
            _ => {
                value.push('\\');
                self.pos += 1;
                return;
            }
        };
        value.push(escaped);
        self.pos += 2;
    }

    fn skip_comment(&mut self) {
        while self.peek_at(0).is_some_and(|b| b != b'\n') {
            self.pos += 1;
        }
    }

    fn open(&mut self, kind: TokenKind) {
        self.depth += 1;
        self.op(kind, 1);
    }

    fn close(&mut self, kind: TokenKind) {
        self.depth = self.depth.saturating_sub(1);
        self.op(kind, 1);
    }

    fn op(&mut self, kind: TokenKind, width: usize) {
        let start = self.pos;
        self.pos += width;
        self.push(kind, start, self.pos);
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token::new(kind, Span::new(start, end)));
    }

    fn advance_line(&mut self) {
        self.pos += 1;
        self.line += 1;
        self.line_start = self.pos;
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn current_char(&self) -> char {
        self.source[self.pos..].chars().next().unwrap_or('\0')
    }

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or_default()
    }

    fn column(&self, pos: usize) -> usize {
        pos - self.line_start + 1
    }

    fn finish(mut self) -> LexResult<Vec<Token>> {
        let end = self.bytes.len();
        let needs_newline = self.tokens.last().is_some_and(|token| {
            !matches!(
                token.kind,
                TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
            )
        });
        if needs_newline {
            self.push(TokenKind::Newline, end, end);
        }

        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, end, end);
        }
        self.push(TokenKind::Eof, end, end);

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenization should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn brackets_join_lines() {
        let kinds = kinds("x = (1,\n     2)\n");
        assert!(!kinds.contains(&TokenKind::Indent));
        assert_eq!(
            kinds.iter().filter(|k| **k == TokenKind::Newline).count(),
            1
        );
    }

    #[test]
    fn triple_quoted_docstring_spans_lines() {
        let kinds = kinds("def f():\n    \"\"\"\n    Doc.\n    \"\"\"\n    pass\n");
        assert!(kinds.contains(&TokenKind::StringLiteral("\n    Doc.\n    ".to_string())));
        assert!(kinds.contains(&TokenKind::Pass));
    }

    #[test]
    fn missing_trailing_newline_is_closed() {
        let kinds = kinds("def f():\n    return 1");
        assert_eq!(
            &kinds[kinds.len() - 3..],
            &[TokenKind::Newline, TokenKind::Dedent, TokenKind::Eof]
        );
    }

    #[test]
    fn string_prefixes() {
        let kinds = kinds("a = f\"{x}!\"\nb = r\"\\d\"\n");
        assert!(kinds.contains(&TokenKind::FString("{x}!".to_string())));
        assert!(kinds.contains(&TokenKind::StringLiteral("\\d".to_string())));
    }

    #[test]
    fn escapes_are_decoded() {
        let kinds = kinds("s = 'a\\nb\\'c'\n");
        assert!(kinds.contains(&TokenKind::StringLiteral("a\nb'c".to_string())));
    }

    #[test]
    fn bitwise_operators() {
        assert_eq!(
            kinds("a << 2 >> b & ~c ^ d | e <= f\n"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::LShift,
                TokenKind::Number("2".into()),
                TokenKind::RShift,
                TokenKind::Identifier("b".into()),
                TokenKind::Amp,
                TokenKind::Tilde,
                TokenKind::Identifier("c".into()),
                TokenKind::Caret,
                TokenKind::Identifier("d".into()),
                TokenKind::Pipe,
                TokenKind::Identifier("e".into()),
                TokenKind::LtEq,
                TokenKind::Identifier("f".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_operators() {
        let kinds = kinds("x = 1_000 ** 2 // 3.5e2 != .5\n");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::Equals,
                TokenKind::Number("1_000".into()),
                TokenKind::DoubleStar,
                TokenKind::Number("2".into()),
                TokenKind::DoubleSlash,
                TokenKind::Number("3.5e2".into()),
                TokenKind::Neq,
                TokenKind::Number(".5".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reports_unterminated_string() {
        let errors = tokenize("x = \"abc\n").expect_err("should fail");
        assert!(matches!(errors[0], LexerError::UnterminatedString { line: 1, .. }));
    }

    #[test]
    fn reports_indentation_mismatch() {
        let errors = tokenize("if x:\n    a = 1\n  b = 2\n").expect_err("should fail");
        assert!(matches!(
            errors[0],
            LexerError::IndentationMismatch {
                expected: 0,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn reports_unexpected_character() {
        let errors = tokenize("x = 1 $ 2\n").expect_err("should fail");
        assert!(matches!(
            errors[0],
            LexerError::UnexpectedCharacter { ch: '$', column: 7, .. }
        ));
    }
}
