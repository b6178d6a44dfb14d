//! Deterministic textual dump of the syntax tree, used by
//! `--type ast`.
//!
//! The dump is itself valid source: operator nodes print
//! fully parenthesized, strings re-escape, and attributes
//! re-attach after the node they annotate, so re-parsing
//! the output yields a structurally equal tree.

use std::fmt;

use crate::construct::tree::{Expr, ExprKind, OpKind};

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ExprKind::*;
        match self.kind {
            Int(n) => write!(f, "{}", n)?,
            Float(x) => write!(f, "{:?}", x)?,
            Bool(b) => write!(f, "{}", b)?,
            Str(ref s) => write!(f, "\"{}\"", escape(s))?,
            Variable(ref name) | Identifier(ref name) | StructKey(ref name) => {
                write!(f, "{}", name)?
            }
            PreVariable(ref name) => write!(f, "@{}", name)?,
            Array(ref items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")?;
            }
            ArgList(ref items) => {
                for (i, item) in items.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
            }
            Structure(ref members) => {
                write!(f, "[")?;
                for (i, (key, value)) in members.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "]")?;
            }
            Function {
                ref params,
                ref body,
            } => {
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, "){{ ")?;
                for line in body {
                    write!(f, "{}; ", line)?;
                }
                write!(f, "}}")?;
            }
            Scope(ref body) => {
                write!(f, "{{ ")?;
                for line in body {
                    write!(f, "{}; ", line)?;
                }
                write!(f, "}}")?;
            }
            Op { kind, ref args } => write_op(f, kind, args)?,
        }

        write_attrs(f, self)
    }
}

fn write_op(f: &mut fmt::Formatter<'_>, kind: OpKind, args: &[Expr]) -> fmt::Result {
    use OpKind::*;
    match kind {
        Call => write!(f, "({}({}))", args[0], args[1]),
        At => write!(f, "({}[{}])", args[0], args[1]),
        Dot | Odot | Adot => write!(f, "({}{}{})", args[0], kind.symbol(), args[1]),
        Cond => write!(f, "({} ? {} : {})", args[0], args[1], args[2]),
        Ret => write!(f, "(|> {})", args[0]),
        Lnot | Inot => write!(f, "({}{})", kind.symbol(), args[0]),
        // inc/dec are rewritten away during parsing
        Inc | Dec => write!(f, "({}{})", kind.symbol(), args[0]),
        _ => write!(f, "({} {} {})", args[0], kind.symbol(), args[1]),
    }
}

fn write_attrs(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    for (key, value) in e.attr.attributes.iter() {
        if value.is_empty() {
            write!(f, "#{}", key)?;
        } else if is_bare_attr_val(value) {
            write!(f, "#{}:{}", key, value)?;
        } else {
            write!(f, "#{}:\"{}\"", key, escape(value))?;
        }
    }
    Ok(())
}

fn is_bare_attr_val(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || "_-./*[]{}".contains(c))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '\u{b}' => out.push_str("\\v"),
            '\u{7}' => out.push_str("\\a"),
            c => out.push(c),
        }
    }
    out
}
