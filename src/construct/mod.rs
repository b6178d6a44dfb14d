//! Syntax datastructures: the expression tree, per-node
//! attributes, and the textual dump.

pub mod attr;
pub mod print;
pub mod tree;

pub use attr::{set_attr, set_lval, set_survey, set_to_call};
pub use tree::{Attr, Expr, ExprKind, OpKind};
