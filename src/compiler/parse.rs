use std::rc::Rc;

use crate::common::{
    error::{Error, Result},
    source::Source,
    span::Span,
};
use crate::compiler::lex::{Delim, Lexer, Opr, Token, Tokens};
use crate::construct::{
    attr::{set_attr, set_lval, set_to_call},
    tree::{Expr, ExprKind, OpKind},
};

/// A precedence-climbing parser over the lexed token
/// stream. Precedence levels are encoded as one method per
/// level, each delegating to the next-tighter level, so
/// the grammar reads top to bottom, loose to tight.
///
/// The parser also performs the rewrites the later passes
/// rely on: `++`/`--` expand to assignments, `=` flags its
/// left operand as an l-value, calls flag their callee,
/// and `#key:val` attributes attach to the nearest
/// preceding expression.
#[derive(Debug)]
pub struct Parser {
    source: Rc<Source>,
    tokens: Tokens,
    index: usize,
}

impl Parser {
    /// Parses a whole source into a single expression.
    pub fn parse(source: Rc<Source>) -> Result<Expr> {
        let tokens = Lexer::lex(Rc::clone(&source))?;
        let mut parser = Parser {
            source,
            tokens,
            index: 0,
        };

        let expr = parser.expression()?;
        if parser.index < parser.tokens.len() {
            return Err(Error::parse(
                "Expected the end of the source here",
                &parser.tokens[parser.index].span,
            ));
        }
        Ok(expr)
    }

    // -- cursor plumbing --

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|t| &t.item)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.index + ahead).map(|t| &t.item)
    }

    fn peek_op(&self) -> Option<Opr> {
        match self.peek() {
            Some(&Token::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn here(&self) -> Span {
        match self.tokens.get(self.index) {
            Some(token) => token.span.clone(),
            None => Span::point(&self.source, self.source.contents.len()),
        }
    }

    fn advance(&mut self) -> Span {
        let span = self.here();
        self.index += 1;
        span
    }

    fn eat(&mut self, expected: &Token, name: &str) -> Result<Span> {
        match self.peek() {
            Some(token) if token == expected => Ok(self.advance()),
            Some(token) => Err(Error::parse(
                &format!("{} is expected but there is {:?}", name, token),
                &self.here(),
            )),
            None => Err(Error::parse(
                &format!("{} is expected but there is nothing", name),
                &self.here(),
            )),
        }
    }

    // -- precedence levels, loose to tight --

    /// `expression := ret_expr`
    fn expression(&mut self) -> Result<Expr> {
        self.ret_expr()
    }

    /// `ret_expr := '|>' assign_expr | assign_expr`
    fn ret_expr(&mut self) -> Result<Expr> {
        if let Some(Opr::Ret) = self.peek_op() {
            let start = self.advance();
            let value = self.assign_expr()?;
            let span = Span::combine(&start, value.span());
            return Ok(Expr::op(OpKind::Ret, vec![value], span));
        }
        self.assign_expr()
    }

    /// `assign_expr := cond_expr ('=' assign_expr)?`
    /// Right-associative; flags the left side as an l-value.
    fn assign_expr(&mut self) -> Result<Expr> {
        let left = self.cond_expr()?;
        if let Some(Opr::Assign) = self.peek_op() {
            self.advance();
            let right = self.assign_expr()?;
            let span = Span::combine(left.span(), right.span());
            return Ok(Expr::op(
                OpKind::Assign,
                vec![set_lval(left, true), right],
                span,
            ));
        }
        Ok(left)
    }

    /// `cond_expr := lor_expr ('?' lor_expr ':' lor_expr)*`
    fn cond_expr(&mut self) -> Result<Expr> {
        let mut left = self.lor_expr()?;
        while let Some(Token::Question) = self.peek() {
            self.advance();
            let then = self.lor_expr()?;
            self.eat(&Token::Colon, "`:`")?;
            let els = self.lor_expr()?;
            let span = Span::combine(left.span(), els.span());
            left = Expr::op(OpKind::Cond, vec![left, then, els], span);
        }
        Ok(left)
    }

    /// Parses one left-associative chain of binary
    /// operators drawn from `table`, with operands from
    /// the `next` tighter level.
    fn binop_chain(
        &mut self,
        table: &[(Opr, OpKind)],
        next: impl Fn(&mut Self) -> Result<Expr> + Copy,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        loop {
            let hit = self
                .peek_op()
                .and_then(|op| table.iter().find(|entry| entry.0 == op))
                .map(|entry| entry.1);
            let kind = match hit {
                Some(kind) => kind,
                None => return Ok(left),
            };
            self.advance();
            let right = next(self)?;
            let span = Span::combine(left.span(), right.span());
            left = Expr::op(kind, vec![left, right], span);
        }
    }

    fn lor_expr(&mut self) -> Result<Expr> {
        self.binop_chain(&[(Opr::Lor, OpKind::Lor)], Self::land_expr)
    }

    fn land_expr(&mut self) -> Result<Expr> {
        self.binop_chain(&[(Opr::Land, OpKind::Land)], Self::ior_expr)
    }

    fn ior_expr(&mut self) -> Result<Expr> {
        self.binop_chain(&[(Opr::Ior, OpKind::Ior)], Self::ixor_expr)
    }

    fn ixor_expr(&mut self) -> Result<Expr> {
        self.binop_chain(&[(Opr::Ixor, OpKind::Ixor)], Self::iand_expr)
    }

    fn iand_expr(&mut self) -> Result<Expr> {
        self.binop_chain(&[(Opr::Iand, OpKind::Iand)], Self::cmp_expr)
    }

    fn cmp_expr(&mut self) -> Result<Expr> {
        self.binop_chain(
            &[
                (Opr::Gt, OpKind::Gt),
                (Opr::Lt, OpKind::Lt),
                (Opr::Gtq, OpKind::Gtq),
                (Opr::Ltq, OpKind::Ltq),
                (Opr::Eeq, OpKind::Eeq),
                (Opr::Neq, OpKind::Neq),
            ],
            Self::shift_expr,
        )
    }

    fn shift_expr(&mut self) -> Result<Expr> {
        self.binop_chain(
            &[(Opr::Shl, OpKind::Shl), (Opr::Shr, OpKind::Shr)],
            Self::add_expr,
        )
    }

    fn add_expr(&mut self) -> Result<Expr> {
        self.binop_chain(
            &[
                (Opr::Add, OpKind::Add),
                (Opr::Sub, OpKind::Sub),
                (Opr::Rem, OpKind::Rem),
            ],
            Self::mul_expr,
        )
    }

    fn mul_expr(&mut self) -> Result<Expr> {
        self.binop_chain(
            &[(Opr::Mul, OpKind::Mul), (Opr::Div, OpKind::Div)],
            Self::pow_expr,
        )
    }

    fn pow_expr(&mut self) -> Result<Expr> {
        self.binop_chain(&[(Opr::Pow, OpKind::Pow)], Self::pre_sinop)
    }

    /// `pre_sinop := ('!'|'~'|'++'|'--')? post_sinop`
    fn pre_sinop(&mut self) -> Result<Expr> {
        let kind = match self.peek_op() {
            Some(Opr::Lnot) => Some(OpKind::Lnot),
            Some(Opr::Inot) => Some(OpKind::Inot),
            Some(Opr::Inc) => Some(OpKind::Inc),
            Some(Opr::Dec) => Some(OpKind::Dec),
            _ => None,
        };
        let kind = match kind {
            Some(kind) => kind,
            None => return self.post_sinop(),
        };

        let start = self.advance();
        let operand = self.post_sinop()?;
        let span = Span::combine(&start, operand.span());
        Ok(match kind {
            OpKind::Inc => step_rewrite(operand, OpKind::Add, span),
            OpKind::Dec => step_rewrite(operand, OpKind::Sub, span),
            kind => Expr::op(kind, vec![operand], span),
        })
    }

    /// `post_sinop := call_expr ('++'|'--')?`
    fn post_sinop(&mut self) -> Result<Expr> {
        let operand = self.call_expr()?;
        let step = match self.peek_op() {
            Some(Opr::Inc) => Some(OpKind::Add),
            Some(Opr::Dec) => Some(OpKind::Sub),
            _ => None,
        };
        match step {
            Some(step) => {
                let end = self.advance();
                let span = Span::combine(operand.span(), &end);
                Ok(step_rewrite(operand, step, span))
            }
            None => Ok(operand),
        }
    }

    /// `call_expr := attr_expr (('(' args ')') | ('[' expression ']'))*`
    fn call_expr(&mut self) -> Result<Expr> {
        let mut left = self.attr_expr()?;
        loop {
            match self.peek() {
                Some(Token::Open(Delim::Paren)) => {
                    let open = self.advance();
                    let mut args = vec![];
                    while !matches!(self.peek(), Some(Token::Close(Delim::Paren))) {
                        args.push(self.expression()?);
                        if let Some(Token::Comma) = self.peek() {
                            self.advance();
                        }
                    }
                    let close = self.advance();
                    let arg_span = Span::combine(&open, &close);
                    let span = Span::combine(left.span(), &close);
                    let arglist = Expr::new(ExprKind::ArgList(args), arg_span);
                    left = Expr::op(OpKind::Call, vec![set_to_call(left, true), arglist], span);
                }
                Some(Token::Open(Delim::Square)) => {
                    self.advance();
                    let index = self.expression()?;
                    let close = self.eat(&Token::Close(Delim::Square), "`]`")?;
                    let span = Span::combine(left.span(), &close);
                    left = Expr::op(OpKind::At, vec![left, index], span);
                }
                _ => return Ok(left),
            }
        }
    }

    /// `attr_expr := dot_expr ('#' identifier (':' attribute_val)?)*`
    fn attr_expr(&mut self) -> Result<Expr> {
        let mut left = self.dot_expr()?;
        left = self.attributes(left)?;
        Ok(left)
    }

    /// Attaches any number of `#key:val` attributes to `e`.
    fn attributes(&mut self, mut e: Expr) -> Result<Expr> {
        while let Some(Token::Hash) = self.peek() {
            self.advance();
            let key = match self.peek() {
                Some(Token::Iden(name)) => {
                    let name = name.clone();
                    self.advance();
                    name
                }
                _ => {
                    return Err(Error::parse(
                        "An attribute name is expected after `#`",
                        &self.here(),
                    ))
                }
            };
            let value = if let Some(Token::Colon) = self.peek() {
                self.advance();
                self.attribute_value()?
            } else {
                String::new()
            };
            e = set_attr(e, &key, &value);
        }
        Ok(e)
    }

    /// An attribute value: either a quoted string, or a
    /// bare run of value characters read straight from the
    /// source text (so `i8*` or `lib/ext.ll` stay whole
    /// even though they span several tokens).
    fn attribute_value(&mut self) -> Result<String> {
        if let Some(Token::Str(s)) = self.peek() {
            let s = s.clone();
            self.advance();
            return Ok(s);
        }

        let start = self.here().offset;
        let contents = &self.source.contents;
        let mut end = start;
        for c in contents[start.min(contents.len())..].chars() {
            if c.is_alphanumeric() || "_-./*[]{}".contains(c) {
                end += c.len_utf8();
            } else {
                break;
            }
        }

        // drop every token the raw run swallowed
        while let Some(token) = self.tokens.get(self.index) {
            if token.span.offset >= end {
                break;
            }
            if token.span.offset + token.span.length > end {
                return Err(Error::parse(
                    "Malformed attribute value",
                    &token.span.clone(),
                ));
            }
            self.index += 1;
        }

        Ok(contents[start..end].to_string())
    }

    /// `dot_expr := primary (('.:'|'.='|'.') struct_key)*`
    fn dot_expr(&mut self) -> Result<Expr> {
        let mut left = self.primary()?;
        loop {
            let kind = match self.peek_op() {
                Some(Opr::Dot) => OpKind::Dot,
                Some(Opr::Odot) => OpKind::Odot,
                Some(Opr::Adot) => OpKind::Adot,
                _ => return Ok(left),
            };
            self.advance();
            let key = self.struct_key()?;
            let span = Span::combine(left.span(), key.span());
            left = Expr::op(kind, vec![left, key], span);
        }
    }

    /// A field selector: an identifier, an operator
    /// symbol, `[]`, or `()`.
    fn struct_key(&mut self) -> Result<Expr> {
        let span = self.here();
        let key = match self.peek() {
            Some(Token::Iden(name)) => {
                let name = name.clone();
                self.advance();
                name
            }
            Some(&Token::Op(op)) if selectable(op) => {
                self.advance();
                op.symbol().to_string()
            }
            Some(Token::Open(Delim::Square))
                if self.peek_at(1) == Some(&Token::Close(Delim::Square)) =>
            {
                self.advance();
                self.advance();
                "[]".to_string()
            }
            Some(Token::Open(Delim::Paren))
                if self.peek_at(1) == Some(&Token::Close(Delim::Paren)) =>
            {
                self.advance();
                self.advance();
                "()".to_string()
            }
            _ => {
                return Err(Error::parse(
                    "A struct key is expected here",
                    &span,
                ))
            }
        };
        Ok(Expr::new(ExprKind::StructKey(key), span))
    }

    /// `primary := literal | variable | pre_variable
    ///           | structure | array | function | scope
    ///           | '(' expression ')'`
    fn primary(&mut self) -> Result<Expr> {
        let span = self.here();
        match self.peek() {
            Some(&Token::Int(n)) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(n), span))
            }
            Some(&Token::Float(x)) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(x), span))
            }
            Some(&Token::Bool(b)) => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(b), span))
            }
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.advance();
                Ok(Expr::new(ExprKind::Str(s), span))
            }
            // signed literals: `-5`, `-1.5`
            Some(&Token::Op(Opr::Sub)) => {
                let start = self.advance();
                match self.peek() {
                    Some(&Token::Int(n)) => {
                        let end = self.advance();
                        Ok(Expr::new(ExprKind::Int(-n), Span::combine(&start, &end)))
                    }
                    Some(&Token::Float(x)) => {
                        let end = self.advance();
                        Ok(Expr::new(ExprKind::Float(-x), Span::combine(&start, &end)))
                    }
                    _ => Err(Error::parse(
                        "A numeric literal is expected after `-`",
                        &self.here(),
                    )),
                }
            }
            Some(Token::Iden(name)) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::new(ExprKind::Variable(name), span))
            }
            Some(Token::PreIden(name)) => {
                let name = name.clone();
                self.advance();
                // pre-variables take their attributes
                // immediately, as in `@import#ir:path`
                self.attributes(Expr::new(ExprKind::PreVariable(name), span))
            }
            Some(Token::Open(Delim::Square)) => self.structure_or_array(),
            Some(Token::Open(Delim::Curly)) => self.scope(),
            Some(Token::Open(Delim::Paren)) => self.function_or_group(),
            Some(token) => Err(Error::parse(
                &format!("An expression is expected but there is {:?}", token),
                &span,
            )),
            None => Err(Error::parse(
                "An expression is expected but there is nothing",
                &span,
            )),
        }
    }

    /// `scope := '{' (expression ';')* '}'`
    fn scope(&mut self) -> Result<Expr> {
        let open = self.advance();
        let body = self.lines(Delim::Curly)?;
        let close = self.advance();
        Ok(Expr::new(
            ExprKind::Scope(body),
            Span::combine(&open, &close),
        ))
    }

    /// Expression lines terminated by `;`, up to (but not
    /// consuming) the closing delimiter.
    fn lines(&mut self, close: Delim) -> Result<Vec<Expr>> {
        let mut body = vec![];
        loop {
            match self.peek() {
                Some(&Token::Close(delim)) if delim == close => return Ok(body),
                Some(_) => {
                    let line = self.expression()?;
                    self.eat(&Token::Semi, "`;`")?;
                    body.push(line);
                }
                None => {
                    return Err(Error::parse(
                        "`}` is expected but there is nothing",
                        &self.here(),
                    ))
                }
            }
        }
    }

    /// Disambiguates `(params){ body }` from `(expression)`
    /// by trying the function form first and rewinding.
    fn function_or_group(&mut self) -> Result<Expr> {
        let saved = self.index;
        let open = self.advance();

        // try: formal parameter list
        let mut params = vec![];
        let mut is_function = true;
        loop {
            match self.peek() {
                Some(Token::Iden(name)) => {
                    let name = name.clone();
                    let span = self.advance();
                    let param =
                        self.attributes(Expr::new(ExprKind::Identifier(name), span))?;
                    params.push(param);
                    if let Some(Token::Comma) = self.peek() {
                        self.advance();
                    }
                }
                Some(Token::Close(Delim::Paren)) => break,
                _ => {
                    is_function = false;
                    break;
                }
            }
        }
        if is_function {
            is_function = self.peek() == Some(&Token::Close(Delim::Paren))
                && self.peek_at(1) == Some(&Token::Open(Delim::Curly));
        }

        if is_function {
            self.advance(); // `)`
            self.advance(); // `{`
            let body = self.lines(Delim::Curly)?;
            let close = self.advance();
            return Ok(Expr::new(
                ExprKind::Function { params, body },
                Span::combine(&open, &close),
            ));
        }

        // rewind: it's a parenthesized expression
        self.index = saved;
        self.advance();
        let inner = self.expression()?;
        self.eat(&Token::Close(Delim::Paren), "`)`")?;
        Ok(inner)
    }

    /// `[` already peeked: a structure when a struct key
    /// and a `:` follow, otherwise an array. The empty
    /// `[]` is an empty structure.
    fn structure_or_array(&mut self) -> Result<Expr> {
        let open = self.advance();

        let saved = self.index;
        let is_structure = match self.peek() {
            Some(Token::Close(Delim::Square)) => true,
            _ => {
                let looks_keyed = self.struct_key().is_ok()
                    && self.peek() == Some(&Token::Colon);
                self.index = saved;
                looks_keyed
            }
        };

        if is_structure {
            let mut members = indexmap::IndexMap::new();
            while !matches!(self.peek(), Some(Token::Close(Delim::Square))) {
                let key = self.struct_key()?;
                self.eat(&Token::Colon, "`:`")?;
                let value = self.expression()?;
                members.insert(key.as_struct_key().unwrap().to_string(), value);
                if let Some(Token::Comma) = self.peek() {
                    self.advance();
                }
            }
            let close = self.advance();
            Ok(Expr::new(
                ExprKind::Structure(members),
                Span::combine(&open, &close),
            ))
        } else {
            let mut items = vec![];
            while !matches!(self.peek(), Some(Token::Close(Delim::Square))) {
                items.push(self.expression()?);
                if let Some(Token::Comma) = self.peek() {
                    self.advance();
                } else if !matches!(self.peek(), Some(Token::Close(Delim::Square))) {
                    return Err(Error::parse(
                        "`,` or `]` is expected here",
                        &self.here(),
                    ));
                }
            }
            let close = self.advance();
            Ok(Expr::new(
                ExprKind::Array(items),
                Span::combine(&open, &close),
            ))
        }
    }
}

/// Whether an operator symbol may appear as a struct key.
fn selectable(op: Opr) -> bool {
    !matches!(op, Opr::Dot | Opr::Odot | Opr::Adot | Opr::Ret | Opr::Assign)
}

/// Expands `++e` / `e++` into `e = e + 1` (and `--` into
/// `e = e - 1`), flagging the target as an l-value. The
/// synthesized nodes inherit the rewrite's source range.
fn step_rewrite(operand: Expr, step: OpKind, span: Span) -> Expr {
    let one = Expr::new(ExprKind::Int(1), span.clone());
    let bumped = Expr::op(step, vec![operand.clone(), one], span.clone());
    Expr::op(
        OpKind::Assign,
        vec![set_lval(operand, true), bumped],
        span,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(source: &str) -> Expr {
        match Parser::parse(Source::source(source)) {
            Ok(expr) => expr,
            Err(e) => panic!("{}", e),
        }
    }

    fn body_of(e: &Expr) -> &[Expr] {
        match e.kind {
            ExprKind::Function { ref body, .. } => body,
            _ => panic!("expected a function literal"),
        }
    }

    fn op_of(e: &Expr) -> (OpKind, &[Expr]) {
        match e.kind {
            ExprKind::Op { kind, ref args } => (kind, args),
            _ => panic!("expected an operator node, got {:?}", e.kind),
        }
    }

    #[test]
    fn int_literal_body() {
        let tree = parse("(){1;}");
        assert_eq!(body_of(&tree)[0].kind, ExprKind::Int(1));
    }

    #[test]
    fn nested_function() {
        let tree = parse("(){(){1;};}");
        let inner = &body_of(&tree)[0];
        assert_eq!(body_of(inner)[0].kind, ExprKind::Int(1));
    }

    #[test]
    fn structure_and_array() {
        let tree = parse("(){[a: 10, b: \"koko\"]; [1, 2, 3]; [];}");
        let lines = body_of(&tree);

        match lines[0].kind {
            ExprKind::Structure(ref members) => {
                assert_eq!(members["a"].kind, ExprKind::Int(10));
                assert_eq!(members["b"].kind, ExprKind::Str("koko".to_string()));
            }
            _ => panic!("expected a structure"),
        }
        match lines[1].kind {
            ExprKind::Array(ref items) => assert_eq!(items.len(), 3),
            _ => panic!("expected an array"),
        }
        // `[]` is an empty structure, matching the grammar
        // rule order
        match lines[2].kind {
            ExprKind::Structure(ref members) => assert!(members.is_empty()),
            _ => panic!("expected an empty structure"),
        }
    }

    #[test]
    fn assignment_is_right_associative_and_flags_lval() {
        let tree = parse("(){a=b=c;}");
        let (kind, args) = op_of(&body_of(&tree)[0]);
        assert_eq!(kind, OpKind::Assign);
        assert!(args[0].attr.lval);
        let (inner_kind, inner_args) = op_of(&args[1]);
        assert_eq!(inner_kind, OpKind::Assign);
        assert!(inner_args[0].attr.lval);
        assert!(!inner_args[1].attr.lval);
    }

    #[test]
    fn increment_rewrites_to_assignment() {
        for source in ["(){++x;}", "(){x++;}"] {
            let tree = parse(source);
            let (kind, args) = op_of(&body_of(&tree)[0]);
            assert_eq!(kind, OpKind::Assign);
            assert!(args[0].attr.lval);
            let (step, step_args) = op_of(&args[1]);
            assert_eq!(step, OpKind::Add);
            assert_eq!(step_args[1].kind, ExprKind::Int(1));
        }
    }

    #[test]
    fn call_flags_callee() {
        let tree = parse("(){a(1);}");
        let (kind, args) = op_of(&body_of(&tree)[0]);
        assert_eq!(kind, OpKind::Call);
        assert!(args[0].attr.to_call);
        assert_eq!(args[1].as_arglist().unwrap().len(), 1);
    }

    #[test]
    fn dot_variants() {
        let tree = parse("(){a.b; a.:b(); a.=b();}");
        let lines = body_of(&tree);

        let (kind, args) = op_of(&lines[0]);
        assert_eq!(kind, OpKind::Dot);
        assert_eq!(args[1].as_struct_key(), Some("b"));

        let (call, call_args) = op_of(&lines[1]);
        assert_eq!(call, OpKind::Call);
        let (odot, _) = op_of(&call_args[0]);
        assert_eq!(odot, OpKind::Odot);

        let (call, call_args) = op_of(&lines[2]);
        assert_eq!(call, OpKind::Call);
        let (adot, _) = op_of(&call_args[0]);
        assert_eq!(adot, OpKind::Adot);
    }

    #[test]
    fn operator_struct_keys() {
        let tree = parse("(){s.+; s.[]; s.();}");
        let lines = body_of(&tree);
        for (line, expected) in lines.iter().zip(["+", "[]", "()"]) {
            let (_, args) = op_of(line);
            assert_eq!(args[1].as_struct_key(), Some(expected));
        }
    }

    #[test]
    fn attributes_attach_to_nearest_expression() {
        let tree = parse("(x#type:i32){|>x;}#rettype:i32");
        assert_eq!(tree.attr.get("rettype"), Some("i32"));
        match tree.kind {
            ExprKind::Function { ref params, .. } => {
                assert_eq!(params[0].attr.get("type"), Some("i32"));
            }
            _ => panic!("expected a function"),
        }
    }

    #[test]
    fn attribute_values_cross_token_boundaries() {
        let tree = parse("(x#type:i8*){|>x;}#rettype:i8*");
        match tree.kind {
            ExprKind::Function { ref params, .. } => {
                assert_eq!(params[0].attr.get("type"), Some("i8*"));
            }
            _ => panic!("expected a function"),
        }
    }

    #[test]
    fn quoted_attribute_values() {
        let tree = parse("(){m = @import#ir:\"ext.ll\"#link:gc;}");
        let (_, args) = op_of(&body_of(&tree)[0]);
        assert_eq!(args[1].attr.get("ir"), Some("ext.ll"));
        assert_eq!(args[1].attr.get("link"), Some("gc"));
    }

    /// For every pair in the precedence table, the looser
    /// operator ends up nearer the root.
    #[test]
    fn precedence_ladder() {
        let ladder = [
            ("||", OpKind::Lor),
            ("&&", OpKind::Land),
            ("|", OpKind::Ior),
            ("^", OpKind::Ixor),
            ("&", OpKind::Iand),
            (">", OpKind::Gt),
            (">>", OpKind::Shr),
            ("+", OpKind::Add),
            ("*", OpKind::Mul),
            ("**", OpKind::Pow),
        ];

        for window in ladder.windows(2) {
            let (loose_sym, loose) = window[0];
            let (tight_sym, tight) = window[1];
            let source = format!("(){{1 {} 2 {} 3;}}", loose_sym, tight_sym);
            let tree = parse(&source);
            let (root, args) = op_of(&body_of(&tree)[0]);
            assert_eq!(root, loose, "in {:?}", source);
            let (nested, _) = op_of(&args[1]);
            assert_eq!(nested, tight, "in {:?}", source);
        }
    }

    #[test]
    fn ternary_chain() {
        let tree = parse("(){|> 1 < 2 ? 100 : 200;}");
        let (ret, ret_args) = op_of(&body_of(&tree)[0]);
        assert_eq!(ret, OpKind::Ret);
        let (cond, cond_args) = op_of(&ret_args[0]);
        assert_eq!(cond, OpKind::Cond);
        let (cmp, _) = op_of(&cond_args[0]);
        assert_eq!(cmp, OpKind::Lt);
    }

    #[test]
    fn negative_literals() {
        let tree = parse("(){-5; -1.5; 1 - 5;}");
        let lines = body_of(&tree);
        assert_eq!(lines[0].kind, ExprKind::Int(-5));
        assert_eq!(lines[1].kind, ExprKind::Float(-1.5));
        let (kind, _) = op_of(&lines[2]);
        assert_eq!(kind, OpKind::Sub);
    }

    #[test]
    fn errors_carry_location() {
        let err = Parser::parse(Source::source("(){1 +;}")).unwrap_err();
        assert_eq!(err.kind, crate::common::ErrorKind::Parse);
        assert!(!err.span.is_empty());
    }

    /// The printer emits valid source whose re-parse is
    /// structurally equal to the original tree.
    #[test]
    fn print_round_trip() {
        let sources = [
            "(){1;}",
            "(){|> 1 + 2 * 3;}",
            "(){a = [10, 20, 30]; |> a[1];}",
            "(){s = [add: (x, y){|> x + y;}]; |> s.:add(3, 4);}",
            "(){|> 1 < 2 ? 100 : 200;}",
            "(x#type:i32){|> x;}#rettype:i32",
            "(){t = \"he\\tllo\"; |> t;}",
            "(){!true; ~1; x = 1; x++;}",
        ];

        for source in sources {
            let tree = parse(source);
            let printed = format!("{}", tree);
            let reparsed = Parser::parse(Source::source(&printed))
                .unwrap_or_else(|e| panic!("reparse of {:?} failed: {}", printed, e));
            assert_eq!(tree, reparsed, "printed form: {}", printed);
        }
    }
}
