use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    /// Top-level function declarations in source order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Function(function) => Some(function),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: Option<Type>,
    pub body: Block,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        params: Vec<Param>,
        ret_ty: Option<Type>,
        body: Block,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            ret_ty,
            body,
        }
    }

    /// The leading string literal of the body, with indentation cleaned up.
    pub fn docstring(&self) -> Option<String> {
        match self.body.statements.first() {
            Some(Statement::Expr(Expr::Literal(Literal::String(doc)))) => Some(clean_doc(doc)),
            _ => None,
        }
    }

    /// True when the body does nothing but document itself: `pass`, `...`, a docstring,
    /// or `raise NotImplementedError`.
    pub fn is_placeholder(&self) -> bool {
        self.body.statements.iter().all(|statement| match statement {
            Statement::Pass => true,
            Statement::Expr(Expr::Literal(Literal::String(_))) => true,
            Statement::Raise(Some(expr)) => raises_not_implemented(expr),
            _ => false,
        })
    }

    /// Canonical signature such as `(n: int, k: int = 2) -> int`.
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|param| {
                render_param(
                    &param.name,
                    param.ty.as_ref().map(ToString::to_string).as_deref(),
                    param.default.as_ref().map(ToString::to_string).as_deref(),
                )
            })
            .collect::<Vec<_>>();
        render_signature(&params, self.ret_ty.as_ref().map(ToString::to_string).as_deref())
    }
}

fn raises_not_implemented(expr: &Expr) -> bool {
    match expr {
        Expr::Identifier(name) => name == "NotImplementedError",
        Expr::Call { func, .. } => raises_not_implemented(func),
        _ => false,
    }
}

/// Renders one parameter the way Python's `inspect.Signature` does: `n: int = 2` when
/// annotated, `n=2` otherwise.
pub fn render_param(name: &str, annotation: Option<&str>, default: Option<&str>) -> String {
    match (annotation, default) {
        (Some(ty), Some(default)) => format!("{name}: {ty} = {default}"),
        (Some(ty), None) => format!("{name}: {ty}"),
        (None, Some(default)) => format!("{name}={default}"),
        (None, None) => name.to_string(),
    }
}

pub fn render_signature(params: &[String], returns: Option<&str>) -> String {
    let mut rendered = format!("({})", params.join(", "));
    if let Some(ret) = returns {
        rendered.push_str(" -> ");
        rendered.push_str(ret);
    }
    rendered
}

/// Strips the common leading indentation of a docstring along with leading and trailing
/// blank lines.
pub fn clean_doc(doc: &str) -> String {
    let lines: Vec<&str> = doc.lines().collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            if idx == 0 {
                line.trim_start()
            } else if line.len() >= indent {
                line.get(indent..).unwrap_or(line.trim_start()).trim_end()
            } else {
                line.trim()
            }
        })
        .collect();

    while cleaned.first().is_some_and(|line| line.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|line| line.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<Type>,
    pub default: Option<Expr>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Option<Type>, default: Option<Expr>) -> Self {
        Self {
            name: name.into(),
            ty,
            default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Simple(String),
    Generic { base: String, args: Vec<Type> },
    Union(Vec<Type>),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Simple(name) => f.write_str(name),
            Type::Generic { base, args } => {
                let args = args.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "{base}[{}]", args.join(", "))
            }
            Type::Union(members) => {
                let members = members.iter().map(ToString::to_string).collect::<Vec<_>>();
                f.write_str(&members.join(" | "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Function(Function),
    Expr(Expr),
    Assignment {
        target: Target,
        expr: Expr,
    },
    AugAssignment {
        target: Target,
        op: BinaryOp,
        expr: Expr,
    },
    Return(Option<Expr>),
    If {
        cond: Box<Expr>,
        then_block: Block,
        elif_blocks: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    For {
        target: Target,
        iterable: Expr,
        body: Block,
    },
    Import {
        module: String,
        alias: Option<String>,
    },
    FromImport {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
    Raise(Option<Expr>),
    Assert {
        cond: Expr,
        message: Option<Expr>,
    },
    Break,
    Continue,
    Pass,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Index { object: Expr, index: Expr },
    Tuple(Vec<Target>),
}

impl Target {
    pub fn from_expr(expr: Expr) -> Option<Self> {
        match expr {
            Expr::Identifier(name) => Some(Target::Name(name)),
            Expr::Index { object, index } => match *index {
                Subscript::Single(index) => Some(Target::Index {
                    object: *object,
                    index,
                }),
                Subscript::Slice { .. } => None,
            },
            Expr::Tuple(items) | Expr::List(items) => items
                .into_iter()
                .map(Target::from_expr)
                .collect::<Option<Vec<_>>>()
                .map(Target::Tuple),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Identifier(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
    },
    Member {
        object: Box<Expr>,
        field: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Subscript>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Comprehension {
        element: Box<Expr>,
        target: Box<Target>,
        iterable: Box<Expr>,
        conditions: Vec<Expr>,
    },
    FString {
        parts: Vec<FStringPart>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Subscript {
    Single(Expr),
    Slice {
        start: Option<Expr>,
        stop: Option<Expr>,
        step: Option<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Positional(Expr),
    Keyword(String, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Expr {
        expr: Box<Expr>,
        spec: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitXor,
    BitOr,
    Eq,
    Ne,
    Lt,
    Gt,
    LtEq,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::LShift => "<<",
            BinaryOp::RShift => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Is => "is",
            BinaryOp::IsNot => "is not",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(value) => f.write_str(&repr_str(value)),
            Literal::Int(value) => write!(f, "{value}"),
            Literal::Float(value) => f.write_str(&repr_float(*value)),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::None => f.write_str("None"),
        }
    }
}

/// Source-like rendering used for default values in canonical signatures.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(literal) => write!(f, "{literal}"),
            Expr::Identifier(name) => f.write_str(name),
            Expr::Unary {
                op: UnaryOp::Neg,
                expr,
            } => write!(f, "-{expr}"),
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => write!(f, "not {expr}"),
            Expr::Unary {
                op: UnaryOp::Invert,
                expr,
            } => write!(f, "~{expr}"),
            Expr::Binary { left, op, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => write!(f, "({then} if {cond} else {otherwise})"),
            Expr::Call { func, args } => {
                let args = args
                    .iter()
                    .map(|arg| match arg {
                        Arg::Positional(expr) => expr.to_string(),
                        Arg::Keyword(name, expr) => format!("{name}={expr}"),
                    })
                    .collect::<Vec<_>>();
                write!(f, "{func}({})", args.join(", "))
            }
            Expr::Member { object, field } => write!(f, "{object}.{field}"),
            Expr::Index { object, index } => match index.as_ref() {
                Subscript::Single(index) => write!(f, "{object}[{index}]"),
                Subscript::Slice { start, stop, step } => {
                    let part = |expr: &Option<Expr>| {
                        expr.as_ref().map(ToString::to_string).unwrap_or_default()
                    };
                    write!(f, "{object}[{}:{}", part(start), part(stop))?;
                    if step.is_some() {
                        write!(f, ":{}", part(step))?;
                    }
                    f.write_str("]")
                }
            },
            Expr::List(items) => write!(f, "[{}]", join_exprs(items)),
            Expr::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Expr::Tuple(items) => write!(f, "({})", join_exprs(items)),
            Expr::Dict(entries) => {
                let entries = entries
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Expr::Comprehension { element, .. } => write!(f, "[{element} for ...]"),
            Expr::FString { .. } => f.write_str("f'...'"),
        }
    }
}

fn join_exprs(items: &[Expr]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Python-style `repr` of a string: single quotes unless the text contains one and no
/// double quote.
pub fn repr_str(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

pub fn repr_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "" } else { "-" };
        format!("{sign}inf")
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value:?}")
    }
}
