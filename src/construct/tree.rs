use indexmap::IndexMap;

use crate::common::span::Span;

/// The attribute block every node carries: the source
/// range it came from, the `#key:val` attribute map, and
/// the three flags the parser and translator communicate
/// through. `lval` marks an assignment target, `to_call`
/// marks a value about to be invoked, and `survey` asks
/// the translator for a dry pass.
#[derive(Debug, Clone)]
pub struct Attr {
    pub span: Span,
    pub attributes: IndexMap<String, String>,
    pub lval: bool,
    pub to_call: bool,
    pub survey: bool,
}

impl Attr {
    pub fn new(span: Span) -> Attr {
        Attr {
            span,
            attributes: IndexMap::new(),
            lval: false,
            to_call: false,
            survey: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }
}

/// Equality on attributes ignores the source range, so
/// that two parses of the same text compare equal.
impl PartialEq for Attr {
    fn eq(&self, other: &Attr) -> bool {
        self.attributes == other.attributes
            && self.lval == other.lval
            && self.to_call == other.to_call
            && self.survey == other.survey
    }
}

/// Operator tags. Each tag fixes an arity, a printable
/// symbol, and whether the operator participates in
/// structure-based dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    // bitwise
    Shl,
    Shr,
    Iand,
    Ior,
    Ixor,
    // logical
    Land,
    Lor,
    Lnot,
    Inot,
    // compare
    Eeq,
    Neq,
    Gt,
    Lt,
    Gtq,
    Ltq,
    // mutate
    Assign,
    Inc,
    Dec,
    // control
    Ret,
    Cond,
    // access
    Call,
    At,
    Dot,
    Odot,
    Adot,
}

impl OpKind {
    /// Number of operand expressions the tag takes.
    pub fn arity(self) -> usize {
        use OpKind::*;
        match self {
            Lnot | Inot | Inc | Dec | Ret => 1,
            Cond => 3,
            _ => 2,
        }
    }

    /// The surface symbol, which doubles as the method
    /// name looked up on structure receivers.
    pub fn symbol(self) -> &'static str {
        use OpKind::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Rem => "%",
            Pow => "**",
            Shl => "<<",
            Shr => ">>",
            Iand => "&",
            Ior => "|",
            Ixor => "^",
            Land => "&&",
            Lor => "||",
            Lnot => "!",
            Inot => "~",
            Eeq => "==",
            Neq => "!=",
            Gt => ">",
            Lt => "<",
            Gtq => ">=",
            Ltq => "<=",
            Assign => "=",
            Inc => "++",
            Dec => "--",
            Ret => "|>",
            Cond => "?",
            Call => "()",
            At => "[]",
            Dot => ".",
            Odot => ".:",
            Adot => ".=",
        }
    }

    /// Whether a structure receiver may overload the
    /// operator by carrying a member of the same name.
    pub fn is_customizable(self) -> bool {
        use OpKind::*;
        matches!(
            self,
            Add | Sub
                | Mul
                | Div
                | Rem
                | Pow
                | Eeq
                | Neq
                | Gt
                | Lt
                | Gtq
                | Ltq
                | Call
                | At
                | Dot
                | Odot
                | Adot
        )
    }
}

/// One node of the syntax tree. The payload lives in
/// [`ExprKind`]; every node carries an [`Attr`].
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub attr: Attr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // leaves
    Int(i32),
    Float(f64),
    Bool(bool),
    Str(String),
    /// An identifier used as an r-value or l-value target.
    Variable(String),
    /// An `@`-prefixed reserved name, without the `@`.
    PreVariable(String),
    /// A formal parameter name.
    Identifier(String),
    /// A field selector after a dot: an identifier or an
    /// operator symbol such as `+`, `[]`, `()`.
    StructKey(String),

    // composites
    Array(Vec<Expr>),
    /// The right operand of a call; only ever appears there.
    ArgList(Vec<Expr>),
    Structure(IndexMap<String, Expr>),
    Function {
        params: Vec<Expr>,
        body: Vec<Expr>,
    },
    Scope(Vec<Expr>),

    /// An operator application; `args.len()` equals the
    /// tag's arity.
    Op {
        kind: OpKind,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Expr {
        Expr {
            kind,
            attr: Attr::new(span),
        }
    }

    pub fn op(kind: OpKind, args: Vec<Expr>, span: Span) -> Expr {
        debug_assert_eq!(kind.arity(), args.len());
        Expr::new(ExprKind::Op { kind, args }, span)
    }

    pub fn span(&self) -> &Span {
        &self.attr.span
    }

    pub fn is_scope(&self) -> bool {
        matches!(self.kind, ExprKind::Scope(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, ExprKind::Function { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, ExprKind::Variable(_))
    }

    /// The selector string of a `StructKey` node.
    pub fn as_struct_key(&self) -> Option<&str> {
        match self.kind {
            ExprKind::StructKey(ref key) => Some(key),
            _ => None,
        }
    }

    /// The elements of an `ArgList` node.
    pub fn as_arglist(&self) -> Option<&[Expr]> {
        match self.kind {
            ExprKind::ArgList(ref args) => Some(args),
            _ => None,
        }
    }

    /// The operands of an operator node with the given tag.
    pub fn as_op(&self, kind: OpKind) -> Option<&[Expr]> {
        match self.kind {
            ExprKind::Op { kind: k, ref args } if k == kind => Some(args),
            _ => None,
        }
    }
}
