pub mod nodes;

pub use nodes::{
    Arg, BinaryOp, Block, Expr, FStringPart, Function, Literal, Param, Program, Statement,
    Subscript, Target, Type, UnaryOp,
};
