use std::fmt;

/// A first-class IR type. Equality is structural, which
/// makes "deduplicated by layout identity" the default for
/// struct types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    I1,
    I8,
    I32,
    I64,
    Double,
    /// The type of a basic-block reference.
    Label,
    Ptr(Box<Type>),
    Array(Box<Type>, usize),
    Struct(Vec<Type>),
    Func {
        params: Vec<Type>,
        ret: Box<Type>,
        vararg: bool,
    },
}

impl Type {
    pub fn ptr(self) -> Type {
        Type::Ptr(Box::new(self))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        *self == Type::Void
    }

    pub fn is_double(&self) -> bool {
        *self == Type::Double
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::I1 | Type::I8 | Type::I32 | Type::I64)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    pub fn is_label(&self) -> bool {
        *self == Type::Label
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(..))
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Type::Func { .. })
    }

    /// A type is fundamental when, after looking through
    /// any levels of pointer, it is not an aggregate.
    /// Fundamental values travel by `store`; aggregates by
    /// `memcpy` of their backing storage.
    pub fn is_fundamental(&self) -> bool {
        match self {
            Type::Ptr(inner) => inner.is_fundamental(),
            Type::Struct(_) | Type::Array(..) => false,
            _ => true,
        }
    }

    /// Byte size of a sized type, using the layout the
    /// printer advertises (no padding beyond power-of-two
    /// scalar sizes).
    pub fn byte_size(&self) -> Option<usize> {
        match self {
            Type::I1 | Type::I8 => Some(1),
            Type::I32 => Some(4),
            Type::I64 | Type::Double | Type::Ptr(_) => Some(8),
            Type::Array(elem, n) => Some(elem.byte_size()? * n),
            Type::Struct(fields) => {
                let mut total = 0;
                for field in fields {
                    total += field.byte_size()?;
                }
                Some(total)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::I1 => write!(f, "i1"),
            Type::I8 => write!(f, "i8"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::Double => write!(f, "double"),
            Type::Label => write!(f, "label"),
            Type::Ptr(inner) => write!(f, "{}*", inner),
            Type::Array(elem, n) => write!(f, "[{} x {}]", n, elem),
            Type::Struct(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, " }}")
            }
            Type::Func {
                params,
                ret,
                vararg,
            } => {
                write!(f, "{} (", ret)?;
                for (i, param) in params.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                if *vararg {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Parses a type written in the IR's textual syntax, e.g.
/// `i32`, `i8*`, `[4 x double]`, `{ i32, i8* }`, or
/// `i32 (i8*, ...)`.
pub fn parse_type(text: &str) -> Result<Type, String> {
    let mut cursor = Cursor {
        text: text.trim(),
        pos: 0,
    };
    let ty = cursor.parse()?;
    cursor.skip_ws();
    if cursor.pos != cursor.text.len() {
        return Err(format!(
            "trailing characters after type: `{}`",
            &cursor.text[cursor.pos..]
        ));
    }
    Ok(ty)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, prefix: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn parse(&mut self) -> Result<Type, String> {
        let mut ty = self.parse_base()?;

        // pointer and function suffixes bind postfix
        loop {
            if self.eat("*") {
                ty = ty.ptr();
            } else if self.peek_paren() {
                self.eat("(");
                let mut params = vec![];
                let mut vararg = false;
                loop {
                    if self.eat(")") {
                        break;
                    }
                    if self.eat("...") {
                        vararg = true;
                        self.eat(",");
                        continue;
                    }
                    params.push(self.parse()?);
                    self.eat(",");
                }
                ty = Type::Func {
                    params,
                    ret: Box::new(ty),
                    vararg,
                };
            } else {
                return Ok(ty);
            }
        }
    }

    fn peek_paren(&mut self) -> bool {
        self.skip_ws();
        self.rest().starts_with('(')
    }

    fn parse_base(&mut self) -> Result<Type, String> {
        self.skip_ws();

        if self.eat("[") {
            self.skip_ws();
            let len_text: String = self
                .rest()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if len_text.is_empty() {
                return Err("expected an array length".to_string());
            }
            self.pos += len_text.len();
            let n: usize = len_text.parse().map_err(|_| "bad array length")?;
            if !self.eat("x") {
                return Err("expected `x` in array type".to_string());
            }
            let elem = self.parse()?;
            if !self.eat("]") {
                return Err("expected `]` to close array type".to_string());
            }
            return Ok(Type::Array(Box::new(elem), n));
        }

        if self.eat("{") {
            let mut fields = vec![];
            loop {
                if self.eat("}") {
                    break;
                }
                fields.push(self.parse()?);
                self.eat(",");
            }
            return Ok(Type::Struct(fields));
        }

        for (name, ty) in [
            ("void", Type::Void),
            ("double", Type::Double),
            ("label", Type::Label),
            ("i64", Type::I64),
            ("i32", Type::I32),
            ("i8", Type::I8),
            ("i1", Type::I1),
        ] {
            if self.rest().starts_with(name) {
                let after = self.rest()[name.len()..].chars().next();
                // don't let `i32` eat the front of `i32abc`
                if !matches!(after, Some(c) if c.is_alphanumeric()) {
                    self.pos += name.len();
                    return Ok(ty);
                }
            }
        }

        Err(format!("unknown type at `{}`", self.rest()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scalars_and_pointers() {
        assert_eq!(parse_type("i32").unwrap(), Type::I32);
        assert_eq!(parse_type("i8*").unwrap(), Type::I8.ptr());
        assert_eq!(parse_type("i8**").unwrap(), Type::I8.ptr().ptr());
        assert_eq!(parse_type("double").unwrap(), Type::Double);
        assert_eq!(parse_type(" void ").unwrap(), Type::Void);
    }

    #[test]
    fn aggregates() {
        assert_eq!(
            parse_type("[4 x i32]").unwrap(),
            Type::Array(Box::new(Type::I32), 4)
        );
        assert_eq!(
            parse_type("{ i32, i8* }").unwrap(),
            Type::Struct(vec![Type::I32, Type::I8.ptr()])
        );
    }

    #[test]
    fn functions() {
        let ty = parse_type("i32 (i32, i8**)").unwrap();
        assert_eq!(
            ty,
            Type::Func {
                params: vec![Type::I32, Type::I8.ptr().ptr()],
                ret: Box::new(Type::I32),
                vararg: false,
            }
        );

        let vararg = parse_type("i32 (i8*, ...)").unwrap();
        assert!(matches!(vararg, Type::Func { vararg: true, .. }));
    }

    #[test]
    fn round_trip_display() {
        for text in ["i32", "i8*", "[4 x i32]", "{ i32, double }", "i32 (i8*, ...)"] {
            let ty = parse_type(text).unwrap();
            assert_eq!(parse_type(&ty.to_string()).unwrap(), ty);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_type("i33").is_err());
        assert!(parse_type("[x i32]").is_err());
        assert!(parse_type("i32 extra").is_err());
    }
}
