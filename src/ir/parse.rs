//! A declaration scanner for textual IR files.
//!
//! `@import` only needs the externally linkable function
//! signatures out of an imported `.ll` file, so this walks
//! `define`/`declare` lines instead of parsing whole
//! bodies. Intrinsics (names starting with `llvm.`) are
//! skipped at the import site, not here.

use crate::ir::ty::{parse_type, Type};

/// One scanned function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFunc {
    pub name: String,
    pub ty: Type,
}

/// Scans IR text for `define` and `declare` lines and
/// returns their signatures in file order.
pub fn scan_declarations(text: &str) -> Result<Vec<ScannedFunc>, String> {
    let mut found = vec![];

    for line in text.lines() {
        let line = line.trim();
        let rest = if let Some(rest) = line.strip_prefix("define ") {
            rest
        } else if let Some(rest) = line.strip_prefix("declare ") {
            rest
        } else {
            continue;
        };

        let at = match rest.find('@') {
            Some(at) => at,
            None => continue,
        };

        let ret = scan_ret_type(&rest[..at])
            .ok_or_else(|| format!("cannot read the return type in `{}`", line))?;

        let after = &rest[at + 1..];
        let open = after
            .find('(')
            .ok_or_else(|| format!("missing parameter list in `{}`", line))?;
        let name = after[..open].trim().to_string();

        let close = matching_paren(&after[open..])
            .ok_or_else(|| format!("unbalanced parameter list in `{}`", line))?;
        let (params, vararg) = scan_params(&after[open + 1..open + close])?;

        found.push(ScannedFunc {
            name,
            ty: Type::Func {
                params,
                ret: Box::new(ret),
                vararg,
            },
        });
    }

    Ok(found)
}

/// The return type is the longest trailing chunk of the
/// text before `@` that parses as a type; everything
/// before it is linkage and attribute noise.
fn scan_ret_type(before_at: &str) -> Option<Type> {
    let words: Vec<&str> = before_at.split_whitespace().collect();
    for start in 0..words.len() {
        let candidate = words[start..].join(" ");
        if let Ok(ty) = parse_type(&candidate) {
            return Some(ty);
        }
    }
    None
}

/// Byte offset of the `)` matching the `(` the slice
/// starts with.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a parameter list on top-level commas and parses
/// the leading type of each parameter, dropping names and
/// attributes.
fn scan_params(text: &str) -> Result<(Vec<Type>, bool), String> {
    let mut params = vec![];
    let mut vararg = false;

    for chunk in split_top_level(text) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        if chunk == "..." {
            vararg = true;
            continue;
        }

        // the type is the longest leading run of words
        // that still parses; `i8* nocapture %s` -> `i8*`
        let words: Vec<&str> = chunk.split_whitespace().collect();
        let mut parsed = None;
        for end in (1..=words.len()).rev() {
            let candidate = words[..end].join(" ");
            if let Ok(ty) = parse_type(&candidate) {
                parsed = Some(ty);
                break;
            }
        }
        match parsed {
            Some(ty) => params.push(ty),
            None => return Err(format!("cannot read a parameter type in `{}`", chunk)),
        }
    }

    Ok((params, vararg))
}

fn split_top_level(text: &str) -> Vec<String> {
    let mut chunks = vec![];
    let mut depth = 0usize;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                chunks.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    chunks.push(current);
    chunks
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scans_defines_and_declares() {
        let text = "\
; ModuleID = 'ext'
define i32 @foo(i32 %x) {
entry:
  ret i32 %x
}
declare dso_local i8* @strdup(i8* nocapture readonly)
declare void @llvm.memcpy.p0i8.p0i8.i64(i8*, i8*, i64, i1)
";
        let funcs = scan_declarations(text).unwrap();
        assert_eq!(funcs.len(), 3);

        assert_eq!(funcs[0].name, "foo");
        assert_eq!(
            funcs[0].ty,
            Type::Func {
                params: vec![Type::I32],
                ret: Box::new(Type::I32),
                vararg: false,
            }
        );

        assert_eq!(funcs[1].name, "strdup");
        assert_eq!(
            funcs[1].ty,
            Type::Func {
                params: vec![Type::I8.ptr()],
                ret: Box::new(Type::I8.ptr()),
                vararg: false,
            }
        );

        assert_eq!(funcs[2].name, "llvm.memcpy.p0i8.p0i8.i64");
    }

    #[test]
    fn varargs() {
        let funcs = scan_declarations("declare i32 @printf(i8*, ...)\n").unwrap();
        assert_eq!(funcs[0].name, "printf");
        assert!(matches!(funcs[0].ty, Type::Func { vararg: true, .. }));
    }

    #[test]
    fn scans_own_output() {
        use crate::ir::builder::Builder;
        use crate::ir::module::Module;

        let mut module = Module::new("self");
        let func = module.add_function(
            Some("twice"),
            Type::Func {
                params: vec![Type::I32],
                ret: Box::new(Type::I32),
                vararg: false,
            },
        );
        let entry = module.create_named_block(func, "entry");
        let mut builder = Builder::new(module);
        builder.set_insert_block(Some(entry));
        let arg = builder.module().arg_val(func, 0);
        let doubled = builder.binary(crate::ir::instr::BinTag::Add, &arg, &arg);
        builder.ret(&doubled);

        let text = builder.finish().print_to_string();
        let funcs = scan_declarations(&text).unwrap();
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].name, "twice");
    }
}
