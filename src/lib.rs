//! # Grackle
//! A whole-program compiler for a small expression-oriented
//! language whose source unit is a single top-level function
//! literal.
//!
//! ## Overview of the compilation process
//! Source code is represented as a [`Source`]: a string with
//! an associated path. Regions of source are marked with
//! `Span`s, which most compiler datastructures carry for
//! error reporting.
//!
//! The first phase is lexing: [`compiler::Lexer`] greedily
//! reads the longest next token and produces a stream of
//! spanned tokens. The [`compiler::Parser`] then climbs the
//! precedence ladder to build an attributed syntax tree,
//! performing a few rewrites along the way (increments
//! become assignments, assignment targets are flagged,
//! callees are flagged, `#key:val` attributes attach to the
//! nearest expression).
//!
//! Lowering is driven by [`lower::Translator`], a visitor
//! that walks the tree and emits typed SSA IR through
//! [`ir::Builder`]. Block-structured values (functions with
//! untyped formals, bare scopes) stay *lazy* — the value
//! keeps its syntax tree — until [`lower::evaluate`] meets
//! them at a call site with concrete argument types, where
//! functions materialize through a two-pass instantiation
//! and scopes land as basic blocks.
//!
//! [`lower::Program`] wraps the result: it builds the
//! synthetic program entry, exposes the printed IR, the
//! verifier, and the cleanup optimizer.
//!
//! To compile a source end to end:
//!
//! ```
//! use grackle::{compiler, lower::Program, Source};
//!
//! let source = Source::source("(){ test = 1; |> test + 1; }");
//! let ast = compiler::parse(source).unwrap();
//! let program = Program::create(&ast, "demo").unwrap();
//! assert!(program.irgen().contains("define i32"));
//! ```

pub mod common;
pub mod compiler;
pub mod construct;
pub mod ir;
pub mod lower;

pub use common::{Error, ErrorKind, Source, Span, Spanned};
pub use construct::{Expr, ExprKind, OpKind};
pub use lower::Program;
