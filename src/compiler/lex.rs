use std::rc::Rc;
use std::str::FromStr;

use crate::common::{
    error::{Error, Result},
    source::Source,
    span::{Span, Spanned},
};

/// Bracket pairs recognized by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delim {
    Paren,
    Curly,
    Square,
}

/// Multi-character operator symbols. The mapping back to
/// surface syntax lives in [`Opr::symbol`]; precedence is
/// the parser's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opr {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
    Iand,
    Ior,
    Ixor,
    Land,
    Lor,
    Lnot,
    Inot,
    Eeq,
    Neq,
    Gt,
    Lt,
    Gtq,
    Ltq,
    Assign,
    Inc,
    Dec,
    Ret,
    Dot,
    Odot,
    Adot,
}

impl Opr {
    pub fn symbol(self) -> &'static str {
        use Opr::*;
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
            Dot => ".",
            Odot => ".:",
            Adot => ".=",
        }
    }
}

/// Longest symbols first, so maximal munch falls out of a
/// linear scan.
const OPR_TABLE: &[(&str, Opr)] = &[
    ("|>", Opr::Ret),
    ("<<", Opr::Shl),
    (">>", Opr::Shr),
    ("<=", Opr::Ltq),
    (">=", Opr::Gtq),
    ("==", Opr::Eeq),
    ("!=", Opr::Neq),
    ("&&", Opr::Land),
    ("||", Opr::Lor),
    ("++", Opr::Inc),
    ("--", Opr::Dec),
    ("**", Opr::Pow),
    (".:", Opr::Odot),
    (".=", Opr::Adot),
    ("+", Opr::Add),
    ("-", Opr::Sub),
    ("*", Opr::Mul),
    ("/", Opr::Div),
    ("%", Opr::Rem),
    ("&", Opr::Iand),
    ("|", Opr::Ior),
    ("^", Opr::Ixor),
    ("~", Opr::Inot),
    ("!", Opr::Lnot),
    ("<", Opr::Lt),
    (">", Opr::Gt),
    ("=", Opr::Assign),
    (".", Opr::Dot),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Open(Delim),
    Close(Delim),
    Semi,
    Comma,
    Colon,
    Question,
    Hash,

    Iden(String),
    /// `@`-prefixed reserved name, without the `@`.
    PreIden(String),
    Int(i32),
    Float(f64),
    Bool(bool),
    /// Both quote forms decode into the same token; the
    /// single-quoted form keeps backslash sequences
    /// verbatim (except `\'`).
    Str(String),
    Op(Opr),
}

pub type Tokens = Vec<Spanned<Token>>;

#[derive(Debug)]
pub struct Lexer {
    source: Rc<Source>,
    index: usize,
    tokens: Tokens,
}

impl Lexer {
    /// Lexes a source file into a stream of tokens.
    pub fn lex(source: Rc<Source>) -> Result<Tokens> {
        let mut lexer = Lexer {
            source,
            index: 0,
            tokens: vec![],
        };

        lexer.strip()?;
        while lexer.index < lexer.source.contents.len() {
            let token = lexer.next_token()?;
            lexer.tokens.push(token);
            lexer.strip()?;
        }

        Ok(lexer.tokens)
    }

    fn remaining(&self) -> &str {
        &self.source.contents[self.index..]
    }

    /// Strips whitespace, `// line` comments, and
    /// `/* block */` comments.
    fn strip(&mut self) -> Result<()> {
        let source = Rc::clone(&self.source);
        loop {
            let before = self.index;
            let rest = &source.contents[self.index..];

            let trimmed = rest.trim_start();
            self.index += rest.len() - trimmed.len();

            if trimmed.starts_with("//") {
                match trimmed.find('\n') {
                    Some(n) => self.index += n + 1,
                    None => self.index = self.source.contents.len(),
                }
            } else if trimmed.starts_with("/*") {
                match trimmed.find("*/") {
                    Some(n) => self.index += n + 2,
                    None => {
                        return Err(Error::parse(
                            "Unexpected end of source inside a block comment",
                            &Span::point(&self.source, self.index),
                        ))
                    }
                }
            }

            if self.index == before {
                return Ok(());
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned<Token>> {
        let rest = self.remaining();
        let c = rest.chars().next().unwrap();

        let (token, len) = match c {
            '(' => (Token::Open(Delim::Paren), 1),
            ')' => (Token::Close(Delim::Paren), 1),
            '{' => (Token::Open(Delim::Curly), 1),
            '}' => (Token::Close(Delim::Curly), 1),
            '[' => (Token::Open(Delim::Square), 1),
            ']' => (Token::Close(Delim::Square), 1),
            ';' => (Token::Semi, 1),
            ',' => (Token::Comma, 1),
            '?' => (Token::Question, 1),
            '#' => (Token::Hash, 1),
            // `:` is a plain token unless it forms `.:`,
            // which the operator table has already eaten.
            ':' => (Token::Colon, 1),

            '"' => self.string(true)?,
            '\'' => self.string(false)?,

            '@' => self.pre_iden()?,

            c if c.is_ascii_digit() => self.number()?,
            c if c.is_alphabetic() => self.iden(),

            _ => {
                let table_hit = OPR_TABLE
                    .iter()
                    .find(|(sym, _)| rest.starts_with(sym))
                    .map(|&(sym, op)| (Token::Op(op), sym.len()));
                match table_hit {
                    Some(hit) => hit,
                    None => {
                        return Err(Error::parse(
                            &format!("The character `{}` is not recognized here", c),
                            &Span::point(&self.source, self.index),
                        ))
                    }
                }
            }
        };

        let spanned = Spanned::new(token, Span::new(&self.source, self.index, len));
        self.index += len;
        Ok(spanned)
    }

    /// Consumes a string literal; the opening quote is
    /// still at the current index. Double-quoted strings
    /// are escape-decoded; single-quoted strings keep
    /// backslash sequences verbatim except `\'`.
    fn string(&self, decode: bool) -> Result<(Token, usize)> {
        let quote = if decode { '"' } else { '\'' };
        let mut len = 1;
        let mut escape = false;
        let mut string = String::new();

        for c in self.remaining().chars().skip(1) {
            len += c.len_utf8();
            if escape {
                escape = false;
                if decode {
                    string.push(match c {
                        '\\' => '\\',
                        'n' => '\n',
                        't' => '\t',
                        'b' => '\u{8}',
                        'f' => '\u{c}',
                        'r' => '\r',
                        'v' => '\u{b}',
                        'a' => '\u{7}',
                        // any other sequence keeps the
                        // second character literally
                        o => o,
                    });
                } else if c == '\'' {
                    string.push('\'');
                } else {
                    string.push('\\');
                    string.push(c);
                }
            } else if c == '\\' {
                escape = true;
            } else if c == quote {
                return Ok((Token::Str(string), len));
            } else {
                string.push(c);
            }
        }

        Err(Error::parse(
            "Unexpected end of source while reading a string literal",
            &Span::point(&self.source, self.index + len),
        ))
    }

    fn pre_iden(&self) -> Result<(Token, usize)> {
        let rest = &self.remaining()[1..];
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() || !name.chars().next().unwrap().is_alphabetic() {
            return Err(Error::parse(
                "Expected a name after `@`",
                &Span::point(&self.source, self.index),
            ));
        }
        let len = 1 + name.len();
        Ok((Token::PreIden(name), len))
    }

    fn iden(&self) -> (Token, usize) {
        let name: String = self
            .remaining()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        let len = name.len();
        let token = match name.as_str() {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            _ => Token::Iden(name),
        };
        (token, len)
    }

    /// Integer or decimal literal. A decimal point only
    /// counts when a digit follows, so `1.half` lexes as
    /// an integer followed by a dot.
    fn number(&self) -> Result<(Token, usize)> {
        let rest = self.remaining();
        let int_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();

        let after = &rest[int_len..];
        let is_float = after.starts_with('.')
            && after[1..]
                .chars()
                .next()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false);

        if is_float {
            let frac_len = after[1..].chars().take_while(|c| c.is_ascii_digit()).count();
            let len = int_len + 1 + frac_len;
            let float = f64::from_str(&rest[..len]).map_err(|_| {
                Error::parse(
                    "Decimal literal does not fit in a 64-bit floating-point number",
                    &Span::new(&self.source, self.index, len),
                )
            })?;
            Ok((Token::Float(float), len))
        } else {
            let integer = i32::from_str(&rest[..int_len]).map_err(|_| {
                Error::parse(
                    "Integer literal too large to fit in a signed 32-bit integer",
                    &Span::new(&self.source, self.index, int_len),
                )
            })?;
            Ok((Token::Int(integer), int_len))
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn doesnt_crash(s in "\\PC*") {
            let result = Lexer::lex(Source::source(&s));
            format!("{:?}", result);
        }

        #[test]
        fn integers(n in 0i32..i32::MAX) {
            let tokens = Lexer::lex(Source::source(&n.to_string())).unwrap();
            prop_assert_eq!(&tokens[0].item, &Token::Int(n));
        }

        #[test]
        fn small_positive_floats(x in 0.5..1000000.0) {
            let formatted = format!("{:?}", x);
            let tokens = Lexer::lex(Source::source(&formatted)).unwrap();
            prop_assert_eq!(tokens.len(), 1);
            prop_assert_eq!(&tokens[0].item, &Token::Float(x));
        }
    }

    #[test]
    fn brackets() {
        let tokens = Lexer::lex(Source::source("{[(])}")).unwrap();
        assert_eq!(tokens[0].item, Token::Open(Delim::Curly));
        assert_eq!(tokens[1].item, Token::Open(Delim::Square));
        assert_eq!(tokens[2].item, Token::Open(Delim::Paren));
        assert_eq!(tokens[3].item, Token::Close(Delim::Square));
        assert_eq!(tokens[4].item, Token::Close(Delim::Paren));
        assert_eq!(tokens[5].item, Token::Close(Delim::Curly));
    }

    #[test]
    fn maximal_munch() {
        let tokens = Lexer::lex(Source::source("a.:b.=c|>d<<=")).unwrap();
        let ops: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t.item {
                Token::Op(op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![Opr::Odot, Opr::Adot, Opr::Ret, Opr::Shl, Opr::Assign]);
    }

    #[test]
    fn escape_decoding() {
        let tokens = Lexer::lex(Source::source(r#""\n\t\b\f\r\v\a\\\s\"""#)).unwrap();
        assert_eq!(
            tokens[0].item,
            Token::Str("\n\t\u{8}\u{c}\r\u{b}\u{7}\\s\"".to_string())
        );
    }

    #[test]
    fn raw_strings_keep_backslashes() {
        let tokens = Lexer::lex(Source::source(r"'\n\t\'x'")).unwrap();
        assert_eq!(tokens[0].item, Token::Str("\\n\\t'x".to_string()));
    }

    #[test]
    fn comments_are_stripped() {
        let tokens =
            Lexer::lex(Source::source("1 // one\n/* and\ntwo */ 2")).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].item, Token::Int(1));
        assert_eq!(tokens[1].item, Token::Int(2));
    }

    #[test]
    fn unclosed_string() {
        assert!(Lexer::lex(Source::source("\"asdf\"\"qwerty")).is_err());
    }

    #[test]
    fn booleans_and_idens() {
        let tokens = Lexer::lex(Source::source("true falsey @self")).unwrap();
        assert_eq!(tokens[0].item, Token::Bool(true));
        assert_eq!(tokens[1].item, Token::Iden("falsey".to_string()));
        assert_eq!(tokens[2].item, Token::PreIden("self".to_string()));
    }

    #[test]
    fn empty_source() {
        assert!(Lexer::lex(Source::source("")).unwrap().is_empty());
    }
}
