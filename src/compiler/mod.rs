//! The source-to-AST frontend.

use std::rc::Rc;

use crate::common::{error::Result, source::Source};
use crate::construct::tree::Expr;

pub mod lex;
pub use lex::Lexer;

pub mod parse;
pub use parse::Parser;

/// Lexes a source into its token stream.
#[inline(always)]
pub fn lex(source: Rc<Source>) -> Result<lex::Tokens> {
    Lexer::lex(source)
}

/// Parses a source into a single attributed expression.
#[inline(always)]
pub fn parse(source: Rc<Source>) -> Result<Expr> {
    Parser::parse(source)
}
