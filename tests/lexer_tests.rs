use conjure::lexer::{tokenize, LexerError, TokenKind};

#[test]
fn tokenize_simple_function() {
    let source = "def double(x):\n    return x * 2\n";
    let tokens = tokenize(source).expect("tokenization should succeed");

    let kinds: Vec<TokenKind> = tokens.into_iter().map(|token| token.kind).collect();
    let expected = vec![
        TokenKind::Def,
        TokenKind::Identifier("double".to_string()),
        TokenKind::LParen,
        TokenKind::Identifier("x".to_string()),
        TokenKind::RParen,
        TokenKind::Colon,
        TokenKind::Newline,
        TokenKind::Indent,
        TokenKind::Return,
        TokenKind::Identifier("x".to_string()),
        TokenKind::Star,
        TokenKind::Number("2".to_string()),
        TokenKind::Newline,
        TokenKind::Dedent,
        TokenKind::Eof,
    ];

    assert_eq!(kinds, expected);
}

#[test]
fn comments_and_blank_lines_are_skipped() {
    let source = "# header\n\ndef f():\n\n    # inside\n    pass\n";
    let kinds: Vec<TokenKind> = tokenize(source)
        .expect("tokenization should succeed")
        .into_iter()
        .map(|token| token.kind)
        .collect();

    assert_eq!(kinds.first(), Some(&TokenKind::Def));
    assert_eq!(
        kinds.iter().filter(|kind| **kind == TokenKind::Indent).count(),
        1
    );
    assert!(kinds.contains(&TokenKind::Pass));
}

#[test]
fn annotations_and_arrows() {
    let source = "def f(n: int | None = None) -> list[int]: ...\n";
    let kinds: Vec<TokenKind> = tokenize(source)
        .expect("tokenization should succeed")
        .into_iter()
        .map(|token| token.kind)
        .collect();

    assert!(kinds.contains(&TokenKind::Pipe));
    assert!(kinds.contains(&TokenKind::Arrow));
    assert!(kinds.contains(&TokenKind::Ellipsis));
    assert!(kinds.contains(&TokenKind::LBracket));
}

#[test]
fn tabs_in_indentation_are_rejected() {
    let errors = tokenize("def f():\n\treturn 1\n").expect_err("tabs should be rejected");
    assert!(matches!(errors[0], LexerError::TabsNotAllowed { line: 2, .. }));
}

#[test]
fn unexpected_characters_carry_spans() {
    let errors = tokenize("x = 1 $ 2\n").expect_err("`$` is not a token");
    match &errors[0] {
        LexerError::UnexpectedCharacter { ch, span, .. } => {
            assert_eq!(*ch, '$');
            assert_eq!(span.start(), 6);
        }
        other => panic!("expected unexpected character, got {other:?}"),
    }
    let diagnostic = errors[0].to_diagnostic("<test>");
    assert_eq!(diagnostic.source_id(), "<test>");
}
