//! FILENAME: core/parser/src/lib.rs
//! PURPOSE: Library root for the Tabula report formula parser.
//! CONTEXT: This module exposes the lexer, parser, and AST components
//! needed to convert formula strings into expression trees. Resolution,
//! optimization and evaluation live in the engine crate.
//!
//! PIPELINE: Formula String --> Lexer --> Tokens --> Parser --> AST --> Engine
//!
//! SUPPORTED FEATURES:
//! - Arithmetic: + - * / % ^, implicit multiplication (2x, (a)(b))
//! - Increment/decrement: ++x, x++, --x, x--; factorial: x!
//! - Comparison: = == != <> < <= > >=
//! - Bitwise: & | ~ << >>; logical: && || ! and or not
//! - Ternary: c ? a : b
//! - Identifiers: name, .name, query.name, m.env, r.self, v.total, quoted parts
//! - Strings in single or double quotes, adjacent strings concatenate
//! - Function calls: abs(x), iif(c, a, b); absolute value bars: |x|
//! - eval('1 + 2') with a constant string, expanded at parse time

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

#[cfg(test)]
mod tests;

pub use ast::{BinaryOperator, Expression, Identifier, UnaryOperator, Value};
pub use lexer::Lexer;
pub use parser::{parse, ParseError, ParseResult, Parser};
pub use token::{IdentToken, SpannedToken, Token};
