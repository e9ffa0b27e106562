//! Parser for the template language

pub mod ast;
mod grammar;
pub mod lexer;

pub use ast::*;
pub use grammar::{parse, parse_with_nesting, DEFAULT_MAX_NESTING};
pub use lexer::{tokenize, Token};
