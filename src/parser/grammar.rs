use chumsky::error::SimpleReason;
use chumsky::prelude::*;
use chumsky::Stream;

use crate::ast::nodes::{
    Arg, BinaryOp, Block, Expr, Function, Literal, Param, Program, Statement, Subscript, Target,
    Type, UnaryOp,
};
use crate::lexer::token::{Span, Token, TokenKind};
use crate::utils::errors::{Diagnostic, DiagnosticSeverity};

use super::fstring::parse_fstring;

type TokenParser<O> = BoxedParser<'static, TokenKind, O, Simple<TokenKind>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserError {
    pub message: String,
    pub span: Span,
}

impl ParserError {
    pub fn to_diagnostic(&self, source_id: &str) -> Diagnostic {
        Diagnostic::new(
            DiagnosticSeverity::Error,
            source_id,
            self.span,
            self.message.clone(),
        )
    }
}

impl From<Simple<TokenKind>> for ParserError {
    fn from(value: Simple<TokenKind>) -> Self {
        let span_range = value.span();
        let span = Span::new(span_range.start, span_range.end);
        let message = match value.reason() {
            SimpleReason::Custom(message) => message.clone(),
            _ => {
                let found = match value.found() {
                    Some(found) => format!("unexpected token: {found:?}"),
                    None => "unexpected end of input".to_string(),
                };
                let mut expected = value
                    .expected()
                    .filter_map(|kind| kind.as_ref().map(TokenKind::name))
                    .collect::<Vec<_>>();
                expected.sort_unstable();
                expected.dedup();
                if expected.is_empty() {
                    found
                } else {
                    format!("{found}, expected one of: {}", expected.join(" "))
                }
            }
        };
        Self { message, span }
    }
}

pub fn parse(tokens: &[Token]) -> Result<Program, Vec<ParserError>> {
    run(program_parser(), tokens)
}

/// Parses a single expression followed only by the end of input.
pub fn parse_expression(tokens: &[Token]) -> Result<Expr, Vec<ParserError>> {
    let parser = expr_parser()
        .then_ignore(just(TokenKind::Newline).or_not())
        .then_ignore(just(TokenKind::Eof));
    run(parser, tokens)
}

fn run<O>(
    parser: impl Parser<TokenKind, O, Error = Simple<TokenKind>>,
    tokens: &[Token],
) -> Result<O, Vec<ParserError>> {
    let eof_span = tokens
        .last()
        .map(|token| token.span)
        .unwrap_or_else(|| Span::new(0, 0));

    let end = eof_span.end();
    let stream = Stream::from_iter(
        end..end + 1,
        tokens
            .iter()
            .cloned()
            .map(|token| (token.kind, token.span.into())),
    );

    parser
        .parse(stream)
        .map_err(|errors| errors.into_iter().map(ParserError::from).collect())
}

fn identifier_parser() -> TokenParser<String> {
    select! { TokenKind::Identifier(name) => name }.boxed()
}

fn type_parser() -> TokenParser<Type> {
    recursive(|ty| {
        let name = select! {
            TokenKind::Identifier(name) => name,
            TokenKind::None => "None".to_string(),
            TokenKind::StringLiteral(name) => name,
        };
        let dotted = name
            .then(
                just(TokenKind::Dot)
                    .ignore_then(identifier_parser())
                    .repeated(),
            )
            .foldl(|base, part| format!("{base}.{part}"));

        let atom = dotted
            .then(
                ty.separated_by(just(TokenKind::Comma))
                    .allow_trailing()
                    .delimited_by(just(TokenKind::LBracket), just(TokenKind::RBracket))
                    .or_not(),
            )
            .map(|(base, args)| match args {
                Some(args) => Type::Generic { base, args },
                None => Type::Simple(base),
            })
            .boxed();

        atom.clone()
            .then(just(TokenKind::Pipe).ignore_then(atom).repeated())
            .map(|(first, rest)| {
                if rest.is_empty() {
                    first
                } else {
                    let mut members = vec![first];
                    members.extend(rest);
                    Type::Union(members)
                }
            })
    })
    .boxed()
}

fn number_literal(value: &str) -> Expr {
    let clean_value = value.replace('_', "");
    if clean_value.contains(['.', 'e', 'E']) {
        Expr::Literal(Literal::Float(clean_value.parse().unwrap_or_default()))
    } else {
        match clean_value.parse::<i64>() {
            Ok(int_val) => Expr::Literal(Literal::Int(int_val)),
            Err(_) => Expr::Literal(Literal::Float(clean_value.parse().unwrap_or(f64::INFINITY))),
        }
    }
}

fn literal_expr_parser() -> TokenParser<Expr> {
    let plain = select! {
        TokenKind::StringLiteral(value) => Expr::Literal(Literal::String(value)),
        TokenKind::Number(value) => number_literal(&value),
        TokenKind::True => Expr::Literal(Literal::Bool(true)),
        TokenKind::False => Expr::Literal(Literal::Bool(false)),
        TokenKind::None => Expr::Literal(Literal::None),
    };
    let fstring = select! { TokenKind::FString(content) => content }.try_map(|content, span| {
        parse_fstring(&content).ok_or_else(|| Simple::custom(span, "invalid f-string field"))
    });
    plain.or(fstring).boxed()
}

/// Assignment and loop targets: names, optionally grouped into tuples.
fn target_parser() -> TokenParser<Target> {
    recursive(|target| {
        let grouped = target
            .separated_by(just(TokenKind::Comma))
            .at_least(1)
            .allow_trailing()
            .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen))
            .map(|mut targets| {
                if targets.len() == 1 {
                    targets.remove(0)
                } else {
                    Target::Tuple(targets)
                }
            });
        let atom = identifier_parser().map(Target::Name).or(grouped).boxed();

        atom.clone()
            .then(just(TokenKind::Comma).ignore_then(atom).repeated())
            .map(|(first, rest)| {
                if rest.is_empty() {
                    first
                } else {
                    let mut targets = vec![first];
                    targets.extend(rest);
                    Target::Tuple(targets)
                }
            })
    })
    .boxed()
}

/// Comma separated expressions; more than one (or a trailing comma) makes a tuple.
fn expr_list(expr: TokenParser<Expr>) -> TokenParser<Expr> {
    expr.clone()
        .then(just(TokenKind::Comma).ignore_then(expr).repeated())
        .then(just(TokenKind::Comma).or_not())
        .map(|((first, rest), trailing)| {
            if rest.is_empty() && trailing.is_none() {
                first
            } else {
                let mut items = vec![first];
                items.extend(rest);
                Expr::Tuple(items)
            }
        })
        .boxed()
}

type ComprehensionClause = ((Target, Expr), Vec<Expr>);

fn comprehension(element: Expr, clause: ComprehensionClause) -> Expr {
    let ((target, iterable), conditions) = clause;
    Expr::Comprehension {
        element: Box::new(element),
        target: Box::new(target),
        iterable: Box::new(iterable),
        conditions,
    }
}

/// What may follow the first element inside `(...)` or `[...]`.
#[derive(Clone)]
enum Tail {
    Comprehension(ComprehensionClause),
    Items(Vec<Expr>),
}

enum Postfix {
    Call(Vec<Arg>),
    Member(String),
    Index(Subscript),
}

fn chain_comparisons(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    let mut left = first;
    let mut chained: Option<Expr> = None;
    for (op, right) in rest {
        let comparison = Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right.clone()),
        };
        chained = Some(match chained {
            None => comparison,
            Some(acc) => Expr::Binary {
                left: Box::new(acc),
                op: BinaryOp::And,
                right: Box::new(comparison),
            },
        });
        left = right;
    }
    chained.unwrap_or(left)
}

fn binary_fold(left: Expr, (op, right): (BinaryOp, Expr)) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

pub(super) fn expr_parser() -> TokenParser<Expr> {
    recursive(|expr| {
        let expr: TokenParser<Expr> = expr.boxed();

        let comp_for = just(TokenKind::For)
            .ignore_then(target_parser())
            .then_ignore(just(TokenKind::In))
            .then(expr.clone())
            .then(just(TokenKind::If).ignore_then(expr.clone()).repeated())
            .boxed();

        let tail = choice((
            comp_for.clone().map(Tail::Comprehension),
            just(TokenKind::Comma)
                .ignore_then(
                    expr.clone()
                        .separated_by(just(TokenKind::Comma))
                        .allow_trailing(),
                )
                .map(Tail::Items),
        ))
        .or_not()
        .boxed();

        let paren = expr
            .clone()
            .then(tail.clone())
            .map(|(first, tail)| match tail {
                None => first,
                Some(Tail::Comprehension(clause)) => comprehension(first, clause),
                Some(Tail::Items(rest)) => {
                    let mut items = vec![first];
                    items.extend(rest);
                    Expr::Tuple(items)
                }
            })
            .or_not()
            .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen))
            .map(|inner| inner.unwrap_or(Expr::Tuple(Vec::new())));

        let list = expr
            .clone()
            .then(tail)
            .map(|(first, tail)| match tail {
                None => Expr::List(vec![first]),
                Some(Tail::Comprehension(clause)) => comprehension(first, clause),
                Some(Tail::Items(rest)) => {
                    let mut items = vec![first];
                    items.extend(rest);
                    Expr::List(items)
                }
            })
            .or_not()
            .delimited_by(just(TokenKind::LBracket), just(TokenKind::RBracket))
            .map(|inner| inner.unwrap_or(Expr::List(Vec::new())));

        let dict = expr
            .clone()
            .then_ignore(just(TokenKind::Colon))
            .then(expr.clone())
            .separated_by(just(TokenKind::Comma))
            .allow_trailing()
            .delimited_by(just(TokenKind::LBrace), just(TokenKind::RBrace))
            .map(Expr::Dict);

        let atom = choice((
            literal_expr_parser(),
            identifier_parser().map(Expr::Identifier),
            paren,
            list,
            dict,
        ))
        .boxed();

        let arg = identifier_parser()
            .then_ignore(just(TokenKind::Equals))
            .then(expr.clone())
            .map(|(name, value)| Arg::Keyword(name, value))
            .or(expr
                .clone()
                .then(comp_for.or_not())
                .map(|(element, clause)| match clause {
                    Some(clause) => Arg::Positional(comprehension(element, clause)),
                    None => Arg::Positional(element),
                }));

        let call_suffix = arg
            .separated_by(just(TokenKind::Comma))
            .allow_trailing()
            .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen))
            .map(Postfix::Call);

        let member_suffix = just(TokenKind::Dot)
            .ignore_then(identifier_parser())
            .map(Postfix::Member);

        let slice = expr
            .clone()
            .or_not()
            .then_ignore(just(TokenKind::Colon))
            .then(expr.clone().or_not())
            .then(just(TokenKind::Colon).ignore_then(expr.clone().or_not()).or_not())
            .map(|((start, stop), step)| Subscript::Slice {
                start,
                stop,
                step: step.flatten(),
            });
        let index_suffix = slice
            .or(expr.clone().map(Subscript::Single))
            .delimited_by(just(TokenKind::LBracket), just(TokenKind::RBracket))
            .map(Postfix::Index);

        let postfix = atom
            .then(choice((call_suffix, member_suffix, index_suffix)).repeated())
            .foldl(|object, suffix| match suffix {
                Postfix::Call(args) => Expr::Call {
                    func: Box::new(object),
                    args,
                },
                Postfix::Member(field) => Expr::Member {
                    object: Box::new(object),
                    field,
                },
                Postfix::Index(index) => Expr::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                },
            })
            .boxed();

        let unary = recursive(|unary| {
            let power = postfix
                .clone()
                .then(just(TokenKind::DoubleStar).ignore_then(unary.clone()).or_not())
                .map(|(base, exponent)| match exponent {
                    Some(exponent) => Expr::Binary {
                        left: Box::new(base),
                        op: BinaryOp::Pow,
                        right: Box::new(exponent),
                    },
                    None => base,
                });

            just(TokenKind::Minus)
                .ignore_then(unary.clone())
                .map(|expr| Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(expr),
                })
                .or(just(TokenKind::Tilde).ignore_then(unary.clone()).map(|expr| {
                    Expr::Unary {
                        op: UnaryOp::Invert,
                        expr: Box::new(expr),
                    }
                }))
                .or(just(TokenKind::Plus).ignore_then(unary))
                .or(power)
        })
        .boxed();

        let product = unary
            .clone()
            .then(
                choice((
                    just(TokenKind::Star).to(BinaryOp::Mul),
                    just(TokenKind::DoubleSlash).to(BinaryOp::FloorDiv),
                    just(TokenKind::Slash).to(BinaryOp::Div),
                    just(TokenKind::Percent).to(BinaryOp::Mod),
                ))
                .then(unary)
                .repeated(),
            )
            .foldl(binary_fold)
            .boxed();

        let sum = product
            .clone()
            .then(
                choice((
                    just(TokenKind::Plus).to(BinaryOp::Add),
                    just(TokenKind::Minus).to(BinaryOp::Sub),
                ))
                .then(product)
                .repeated(),
            )
            .foldl(binary_fold)
            .boxed();

        let shift = sum
            .clone()
            .then(
                choice((
                    just(TokenKind::LShift).to(BinaryOp::LShift),
                    just(TokenKind::RShift).to(BinaryOp::RShift),
                ))
                .then(sum)
                .repeated(),
            )
            .foldl(binary_fold)
            .boxed();

        let bit_and = shift
            .clone()
            .then(just(TokenKind::Amp).to(BinaryOp::BitAnd).then(shift).repeated())
            .foldl(binary_fold)
            .boxed();

        let bit_xor = bit_and
            .clone()
            .then(just(TokenKind::Caret).to(BinaryOp::BitXor).then(bit_and).repeated())
            .foldl(binary_fold)
            .boxed();

        let bit_or = bit_xor
            .clone()
            .then(just(TokenKind::Pipe).to(BinaryOp::BitOr).then(bit_xor).repeated())
            .foldl(binary_fold)
            .boxed();

        let comparison_op = choice((
            just(TokenKind::EqEq).to(BinaryOp::Eq),
            just(TokenKind::Neq).to(BinaryOp::Ne),
            just(TokenKind::LtEq).to(BinaryOp::LtEq),
            just(TokenKind::GtEq).to(BinaryOp::GtEq),
            just(TokenKind::Lt).to(BinaryOp::Lt),
            just(TokenKind::Gt).to(BinaryOp::Gt),
            just(TokenKind::Not)
                .ignore_then(just(TokenKind::In))
                .to(BinaryOp::NotIn),
            just(TokenKind::In).to(BinaryOp::In),
            just(TokenKind::Is)
                .ignore_then(just(TokenKind::Not))
                .to(BinaryOp::IsNot),
            just(TokenKind::Is).to(BinaryOp::Is),
        ));

        let comparison = bit_or
            .clone()
            .then(comparison_op.then(bit_or).repeated())
            .map(|(first, rest)| chain_comparisons(first, rest))
            .boxed();

        let negation = just(TokenKind::Not)
            .repeated()
            .then(comparison)
            .foldr(|_, expr| Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            })
            .boxed();

        let conjunction = negation
            .clone()
            .then(just(TokenKind::And).to(BinaryOp::And).then(negation).repeated())
            .foldl(binary_fold)
            .boxed();

        let disjunction = conjunction
            .clone()
            .then(just(TokenKind::Or).to(BinaryOp::Or).then(conjunction).repeated())
            .foldl(binary_fold)
            .boxed();

        disjunction
            .clone()
            .then(
                just(TokenKind::If)
                    .ignore_then(disjunction)
                    .then_ignore(just(TokenKind::Else))
                    .then(expr)
                    .or_not(),
            )
            .map(|(then, branch)| match branch {
                Some((cond, otherwise)) => Expr::Conditional {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                None => then,
            })
    })
    .boxed()
}

fn simple_statement_parser(expr: TokenParser<Expr>) -> TokenParser<Statement> {
    let exprs = expr_list(expr.clone());

    let return_stmt = just(TokenKind::Return)
        .ignore_then(exprs.clone().or_not())
        .map(Statement::Return);

    let pass_stmt = just(TokenKind::Pass)
        .or(just(TokenKind::Ellipsis))
        .to(Statement::Pass);

    let break_stmt = just(TokenKind::Break).to(Statement::Break);
    let continue_stmt = just(TokenKind::Continue).to(Statement::Continue);

    let raise_stmt = just(TokenKind::Raise)
        .ignore_then(expr.clone().or_not())
        .then_ignore(just(TokenKind::From).then(expr.clone()).or_not())
        .map(Statement::Raise);

    let assert_stmt = just(TokenKind::Assert)
        .ignore_then(expr.clone())
        .then(just(TokenKind::Comma).ignore_then(expr.clone()).or_not())
        .map(|(cond, message)| Statement::Assert { cond, message });

    let dotted_name = identifier_parser()
        .separated_by(just(TokenKind::Dot))
        .at_least(1)
        .map(|parts| parts.join("."))
        .boxed();

    let import_stmt = just(TokenKind::Import)
        .ignore_then(dotted_name.clone())
        .then(just(TokenKind::As).ignore_then(identifier_parser()).or_not())
        .map(|(module, alias)| Statement::Import { module, alias });

    let imported_names = identifier_parser()
        .then(just(TokenKind::As).ignore_then(identifier_parser()).or_not())
        .separated_by(just(TokenKind::Comma))
        .at_least(1)
        .allow_trailing()
        .boxed();

    let from_import_stmt = just(TokenKind::From)
        .ignore_then(dotted_name)
        .then_ignore(just(TokenKind::Import))
        .then(
            imported_names
                .clone()
                .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen))
                .or(imported_names),
        )
        .map(|(module, names)| Statement::FromImport { module, names });

    // `total: int = 0`; a bare annotation declares nothing.
    let annotated_assignment = identifier_parser()
        .then_ignore(just(TokenKind::Colon))
        .then_ignore(type_parser())
        .then(just(TokenKind::Equals).ignore_then(exprs.clone()).or_not())
        .map(|(name, value)| match value {
            Some(expr) => Statement::Assignment {
                target: Target::Name(name),
                expr,
            },
            None => Statement::Pass,
        });

    let assign_op = choice((
        just(TokenKind::Equals).to(None),
        just(TokenKind::PlusEq).to(Some(BinaryOp::Add)),
        just(TokenKind::MinusEq).to(Some(BinaryOp::Sub)),
        just(TokenKind::StarEq).to(Some(BinaryOp::Mul)),
        just(TokenKind::SlashEq).to(Some(BinaryOp::Div)),
    ));

    let expr_or_assignment = exprs
        .clone()
        .then(assign_op.then(exprs).or_not())
        .try_map(|(lhs, assignment), span| match assignment {
            None => Ok(Statement::Expr(lhs)),
            Some((op, expr)) => {
                let target = Target::from_expr(lhs)
                    .ok_or_else(|| Simple::custom(span, "invalid assignment target"))?;
                Ok(match op {
                    None => Statement::Assignment { target, expr },
                    Some(op) => Statement::AugAssignment { target, op, expr },
                })
            }
        });

    choice((
        return_stmt,
        pass_stmt,
        break_stmt,
        continue_stmt,
        raise_stmt,
        assert_stmt,
        import_stmt,
        from_import_stmt,
        annotated_assignment,
        expr_or_assignment,
    ))
    .boxed()
}

fn program_parser() -> TokenParser<Program> {
    let newline = just(TokenKind::Newline).repeated().at_least(1).boxed();
    let expr = expr_parser();
    let exprs = expr_list(expr.clone());
    let simple = simple_statement_parser(expr.clone());

    let statement = recursive(|stmt| {
        let block = newline
            .clone()
            .ignore_then(
                stmt.repeated()
                    .at_least(1)
                    .delimited_by(just(TokenKind::Indent), just(TokenKind::Dedent)),
            )
            .map(Block::new)
            .or(simple
                .clone()
                .then_ignore(newline.clone())
                .map(|statement| Block::new(vec![statement])))
            .boxed();

        let elif_block = just(TokenKind::Elif)
            .ignore_then(expr.clone())
            .then_ignore(just(TokenKind::Colon))
            .then(block.clone());

        let if_stmt = just(TokenKind::If)
            .ignore_then(expr.clone())
            .then_ignore(just(TokenKind::Colon))
            .then(block.clone())
            .then(elif_block.repeated())
            .then(
                just(TokenKind::Else)
                    .ignore_then(just(TokenKind::Colon))
                    .ignore_then(block.clone())
                    .or_not(),
            )
            .map(|(((cond, then_block), elif_blocks), else_block)| Statement::If {
                cond: Box::new(cond),
                then_block,
                elif_blocks,
                else_block,
            });

        let while_stmt = just(TokenKind::While)
            .ignore_then(expr.clone())
            .then_ignore(just(TokenKind::Colon))
            .then(block.clone())
            .map(|(cond, body)| Statement::While { cond, body });

        let for_stmt = just(TokenKind::For)
            .ignore_then(target_parser())
            .then_ignore(just(TokenKind::In))
            .then(exprs.clone())
            .then_ignore(just(TokenKind::Colon))
            .then(block.clone())
            .map(|((target, iterable), body)| Statement::For {
                target,
                iterable,
                body,
            });

        let function_param = identifier_parser()
            .then(just(TokenKind::Colon).ignore_then(type_parser()).or_not())
            .then(just(TokenKind::Equals).ignore_then(expr.clone()).or_not())
            .map(|((name, ty), default)| Param::new(name, ty, default));

        let function_params = function_param
            .separated_by(just(TokenKind::Comma))
            .allow_trailing()
            .delimited_by(just(TokenKind::LParen), just(TokenKind::RParen));

        let function_ret_type = just(TokenKind::Arrow).ignore_then(type_parser()).or_not();

        let function = just(TokenKind::Def)
            .ignore_then(identifier_parser())
            .then(function_params)
            .then(function_ret_type)
            .then_ignore(just(TokenKind::Colon))
            .then(block)
            .map(|(((name, params), ret_ty), body)| {
                Statement::Function(Function::new(name, params, ret_ty, body))
            });

        choice((function, if_stmt, while_stmt, for_stmt, simple.clone()))
            .then_ignore(newline.clone().or_not())
            .boxed()
    });

    newline
        .clone()
        .or_not()
        .ignore_then(statement.repeated())
        .then_ignore(newline.or_not())
        .then_ignore(just(TokenKind::Eof))
        .map(Program::new)
        .boxed()
}
