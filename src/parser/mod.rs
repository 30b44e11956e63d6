mod fstring;
pub mod grammar;

pub use grammar::{parse, parse_expression, ParserError};
