//! The rule language: a small, sandboxed, JavaScript-flavoured script.
//!
//! Rule code is parsed once into a [`Program`] and then interpreted against
//! a fixed set of globals. Programs have no access to I/O, the clock,
//! randomness, other rules or the store; every run is bounded by a deadline,
//! a call-depth limit and a cap on string and array sizes.

mod ast;
mod builtins;
mod interpreter;
mod lexer;
mod parser;
mod value;

use std::fmt;

pub use ast::Program;
pub use interpreter::{Fault, Limits, run};
pub use value::{Value, format_number};

/// A syntax error with its 1-based position in the rule source.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at line {}, column {}", self.message, self.line, self.column)
    }
}

/// Parse rule source into an executable program.
pub fn compile(source: &str) -> Result<Program, ParseError> {
    parser::parse(source)
}
