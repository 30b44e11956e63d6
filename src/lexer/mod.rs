pub mod token;
pub mod tokenizer;

pub use token::{Span, Token, TokenKind};
pub use tokenizer::{tokenize, LexResult, LexerError};
