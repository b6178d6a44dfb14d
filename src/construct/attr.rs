//! Attribute setter visitors.
//!
//! The parser and translator communicate through the flag
//! bits on [`Attr`]: most setters touch a single node, but
//! `survey` propagates through every sub-expression of
//! compound operators so a whole statement can be marked
//! for a dry pass.

use crate::construct::tree::{Expr, ExprKind};

/// Marks a single node as an assignment target.
pub fn set_lval(mut e: Expr, val: bool) -> Expr {
    e.attr.lval = val;
    e
}

/// Marks a single node as a value about to be invoked.
pub fn set_to_call(mut e: Expr, val: bool) -> Expr {
    e.attr.to_call = val;
    e
}

/// Attaches a `#key:val` attribute to a single node.
pub fn set_attr(mut e: Expr, key: &str, val: &str) -> Expr {
    e.attr.attributes.insert(key.to_string(), val.to_string());
    e
}

/// Marks a node for a dry translation pass, recursing
/// through operator operands. Non-operator composites
/// (functions, scopes, literals) get the flag on the node
/// itself only; their bodies are revisited when they are
/// evaluated.
pub fn set_survey(mut e: Expr, val: bool) -> Expr {
    set_survey_mut(&mut e, val);
    e
}

fn set_survey_mut(e: &mut Expr, val: bool) {
    e.attr.survey = val;
    if let ExprKind::Op { ref mut args, .. } = e.kind {
        for arg in args {
            set_survey_mut(arg, val);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::span::Span;
    use crate::construct::tree::OpKind;

    fn int(n: i32) -> Expr {
        Expr::new(ExprKind::Int(n), Span::empty())
    }

    fn every_survey(e: &Expr) -> bool {
        e.attr.survey
            && match e.kind {
                ExprKind::Op { ref args, .. } => args.iter().all(every_survey),
                _ => true,
            }
    }

    #[test]
    fn survey_reaches_operator_leaves() {
        let tree = Expr::op(
            OpKind::Add,
            vec![
                int(1),
                Expr::op(OpKind::Mul, vec![int(2), int(3)], Span::empty()),
            ],
            Span::empty(),
        );

        let marked = set_survey(tree, true);
        assert!(every_survey(&marked));
    }

    #[test]
    fn lval_touches_one_node() {
        let tree = Expr::op(OpKind::Add, vec![int(1), int(2)], Span::empty());
        let marked = set_lval(tree, true);

        assert!(marked.attr.lval);
        if let ExprKind::Op { args, .. } = marked.kind {
            assert!(!args[0].attr.lval);
            assert!(!args[1].attr.lval);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn equality_ignores_spans() {
        let a = int(7);
        let mut b = int(7);
        b.attr.span = Span::empty();
        assert_eq!(a, b);

        let c = set_lval(int(7), true);
        assert_ne!(a, c);
    }
}
