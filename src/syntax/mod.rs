//! Live syntax tree reconstructed by the scanner

pub mod expressions;
pub mod statements;

pub use expressions::{ArgsSyntax, ExpressionSyntax};
pub use statements::{Attribute, StatementSyntax};

use crate::list::LinkedList;
use std::fmt::Write;

/// A block body in execution order
pub type Program = LinkedList<StatementSyntax>;

/// One numbered line per statement, in execution order
pub fn pretty(program: &Program) -> String {
    let mut out = String::new();
    for (i, (_, statement)) in program.iter().enumerate() {
        let _ = writeln!(out, "{:4}  {}", i, statement);
    }
    out
}
