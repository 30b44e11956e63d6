use conjure::ast::{BinaryOp, Expr, Literal, Statement, Target, Type};
use conjure::lexer::tokenize;
use conjure::parser::{parse, parse_expression};

fn parse_source(source: &str) -> conjure::ast::Program {
    let tokens = tokenize(source).expect("tokenization should succeed");
    parse(&tokens).expect("parsing should succeed")
}

#[test]
fn parse_annotated_stub() {
    let program = parse_source(
        "def fibonacci(n: int) -> int:\n    \"\"\"\n    Returns the nth Fibonacci number.\n    0, 1, 1, 2, 3, 5, 8...\n    \"\"\"\n    pass\n",
    );

    let functions: Vec<_> = program.functions().collect();
    assert_eq!(functions.len(), 1);
    let function = functions[0];
    assert_eq!(function.name, "fibonacci");
    assert_eq!(function.params[0].ty, Some(Type::Simple("int".to_string())));
    assert_eq!(function.ret_ty, Some(Type::Simple("int".to_string())));
    assert!(function.is_placeholder());
    assert_eq!(
        function.docstring().as_deref(),
        Some("Returns the nth Fibonacci number.\n0, 1, 1, 2, 3, 5, 8...")
    );
    assert_eq!(function.signature(), "(n: int) -> int");
}

#[test]
fn parse_defaults_and_generic_annotations() {
    let program = parse_source(
        "def pick(items: list[str], sep: str = ', ', limit: int | None = None, flag=True):\n    ...\n",
    );
    let function = program.functions().next().expect("one function");
    assert_eq!(
        function.signature(),
        "(items: list[str], sep: str = ', ', limit: int | None = None, flag=True)"
    );
}

#[test]
fn parse_function_call_assignment() {
    let program = parse_source("x = add(2, 3)\n");
    assert_eq!(program.statements.len(), 1);

    match &program.statements[0] {
        Statement::Assignment { target, expr } => {
            assert_eq!(target, &Target::Name("x".to_string()));
            match expr {
                Expr::Call { func, args } => {
                    match &**func {
                        Expr::Identifier(name) => assert_eq!(name, "add"),
                        other => panic!("expected identifier callee, got {:?}", other),
                    }
                    assert_eq!(args.len(), 2);
                }
                other => panic!("expected call expression, got {:?}", other),
            }
        }
        other => panic!("expected assignment statement, got {:?}", other),
    }
}

#[test]
fn parse_control_flow() {
    let program = parse_source(
        "def classify(n):\n    if n < 0:\n        return 'negative'\n    elif n == 0:\n        return 'zero'\n    else:\n        for i in range(n):\n            if i > 3:\n                break\n        return 'positive'\n",
    );
    let function = program.functions().next().expect("one function");
    assert!(!function.is_placeholder());
    match &function.body.statements[0] {
        Statement::If {
            elif_blocks,
            else_block,
            ..
        } => {
            assert_eq!(elif_blocks.len(), 1);
            assert!(else_block.is_some());
        }
        other => panic!("expected if statement, got {:?}", other),
    }
}

#[test]
fn parse_tuple_unpacking_and_augmented_assignment() {
    let program = parse_source("a, b = 0, 1\na += b\n");
    assert!(matches!(
        &program.statements[0],
        Statement::Assignment {
            target: Target::Tuple(targets),
            expr: Expr::Tuple(_),
        } if targets.len() == 2
    ));
    assert!(matches!(
        &program.statements[1],
        Statement::AugAssignment {
            op: BinaryOp::Add,
            ..
        }
    ));
}

#[test]
fn chained_comparisons_become_conjunctions() {
    let tokens = tokenize("0 <= x < 10").expect("tokenization should succeed");
    let expr = parse_expression(&tokens).expect("parsing should succeed");
    assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
}

#[test]
fn expression_literals() {
    let tokens = tokenize("-3").expect("tokenization should succeed");
    let expr = parse_expression(&tokens).expect("parsing should succeed");
    assert!(matches!(expr, Expr::Unary { .. } | Expr::Literal(Literal::Int(-3))));
}

#[test]
fn parse_errors_report_spans() {
    let tokens = tokenize("def broken(:\n    pass\n").expect("tokenization should succeed");
    let errors = parse(&tokens).expect_err("parsing should fail");
    assert!(!errors.is_empty());
    let diagnostic = errors[0].to_diagnostic("<test>");
    assert!(diagnostic.span().start() >= 10);
}

#[test]
fn comprehension_targets_unpack_tuples() {
    let tokens = tokenize("[a + b for a, b in pairs if a]").expect("tokenization should succeed");
    let expr = parse_expression(&tokens).expect("parsing should succeed");
    let (target, conditions) = match expr {
        Expr::Comprehension {
            target, conditions, ..
        } => (target, conditions),
        other => panic!("expected a comprehension, got {other:?}"),
    };
    match *target {
        Target::Tuple(names) => assert_eq!(
            names,
            [Target::Name("a".to_string()), Target::Name("b".to_string())]
        ),
        other => panic!("expected a tuple target, got {other:?}"),
    }
    assert_eq!(conditions.len(), 1);
}

#[test]
fn bitwise_precedence_sits_between_comparison_and_arithmetic() {
    // a | b ^ c & d << 1 + 2 == e  parses as  ((a | (b ^ (c & (d << (1 + 2))))) == e)
    let tokens = tokenize("a | b ^ c & d << 1 + 2 == e").expect("tokenization should succeed");
    let expr = parse_expression(&tokens).expect("parsing should succeed");
    let Expr::Binary {
        left,
        op: BinaryOp::Eq,
        ..
    } = expr
    else {
        panic!("comparison should bind loosest");
    };
    assert_eq!(left.to_string(), "(a | (b ^ (c & (d << (1 + 2)))))");
}
