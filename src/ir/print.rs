//! Textual printer for the IR, in LLVM's `.ll` dialect.
//! Output is deterministic: locals number off in emission
//! order, blocks keep their creation order, and string
//! globals print in intern order.

use std::collections::HashMap;
use std::fmt::Write;

use crate::ir::instr::{BlockId, Const, FuncId, InstrId, Op, Val, ValKind};
use crate::ir::module::Module;
use crate::ir::ty::Type;

impl Module {
    pub fn print_to_string(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "; ModuleID = '{}'", self.name);
        if let Some(ref triple) = self.target_triple {
            let _ = writeln!(out, "target triple = \"{}\"", triple);
        }
        let _ = writeln!(out);

        for global in &self.globals {
            let _ = writeln!(
                out,
                "@{} = private unnamed_addr constant [{} x i8] c\"{}\"",
                global.name,
                global.data.len(),
                escape_bytes(&global.data),
            );
        }
        if !self.globals.is_empty() {
            let _ = writeln!(out);
        }

        for (id, func) in self.funcs.iter().enumerate() {
            if func.detached {
                continue;
            }
            if func.is_declaration() {
                let _ = writeln!(
                    out,
                    "declare {} @{}({})",
                    func.ret_type(),
                    self.func_name(id),
                    signature(func.param_types(), func.is_vararg()),
                );
            } else {
                self.print_function(&mut out, id);
            }
        }

        out
    }

    pub fn func_name(&self, func: FuncId) -> String {
        match self.funcs[func].name {
            Some(ref name) if !name.is_empty() => name.clone(),
            _ => format!("f{}", func),
        }
    }

    fn block_label(&self, block: BlockId) -> String {
        match self.blocks[block].label {
            Some(ref label) => label.clone(),
            None => format!("bb{}", block),
        }
    }

    fn print_function(&self, out: &mut String, id: FuncId) {
        let func = &self.funcs[id];

        let mut params = vec![];
        for (i, ty) in func.param_types().iter().enumerate() {
            params.push(format!("{} %{}", ty, i));
        }
        if func.is_vararg() {
            params.push("...".to_string());
        }
        let _ = writeln!(
            out,
            "define {} @{}({}) {{",
            func.ret_type(),
            self.func_name(id),
            params.join(", "),
        );

        // assign local names: arguments first, then every
        // value-producing instruction
        let mut names: HashMap<InstrId, String> = HashMap::new();
        let mut used: HashMap<String, usize> = HashMap::new();
        let mut counter = func.param_types().len();
        for &block in &func.blocks {
            for &instr in &self.blocks[block].instrs {
                let ins = &self.instrs[instr];
                if ins.ty.is_void() {
                    continue;
                }
                let name = match ins.op {
                    Op::Alloca {
                        name: Some(ref n), ..
                    } => {
                        let seen = used.entry(n.clone()).or_insert(0);
                        *seen += 1;
                        if *seen == 1 {
                            n.clone()
                        } else {
                            format!("{}{}", n, *seen - 1)
                        }
                    }
                    _ => {
                        let numbered = counter.to_string();
                        counter += 1;
                        numbered
                    }
                };
                names.insert(instr, name);
            }
        }

        for &block in &func.blocks {
            let _ = writeln!(out, "{}:", self.block_label(block));
            for &instr in &self.blocks[block].instrs {
                self.print_instr(out, instr, &names);
            }
        }

        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
    }

    fn print_instr(&self, out: &mut String, id: InstrId, names: &HashMap<InstrId, String>) {
        let instr = &self.instrs[id];
        let lhs = match names.get(&id) {
            Some(name) => format!("  %{} = ", name),
            None => "  ".to_string(),
        };

        let text = match instr.op {
            Op::Binary {
                tag,
                ref lhs,
                ref rhs,
            } => format!(
                "{} {} {}, {}",
                tag.mnemonic(),
                lhs.ty,
                self.val(lhs, names),
                self.val(rhs, names),
            ),
            Op::Icmp {
                cond,
                ref lhs,
                ref rhs,
            } => format!(
                "icmp {} {} {}, {}",
                cond.mnemonic(),
                lhs.ty,
                self.val(lhs, names),
                self.val(rhs, names),
            ),
            Op::Cast { tag, ref val } => format!(
                "{} {} {} to {}",
                tag.mnemonic(),
                val.ty,
                self.val(val, names),
                instr.ty,
            ),
            Op::Alloca { ref ty, .. } => format!("alloca {}", ty),
            Op::Load { ref ptr } => {
                format!("load {}, {} {}", instr.ty, ptr.ty, self.val(ptr, names))
            }
            Op::Store { ref val, ref ptr } => format!(
                "store {} {}, {} {}",
                val.ty,
                self.val(val, names),
                ptr.ty,
                self.val(ptr, names),
            ),
            Op::Gep {
                ref base,
                ref indices,
                inbounds,
            } => {
                let pointee = base.ty.pointee().expect("gep over a non-pointer");
                let mut text = format!(
                    "getelementptr {}{}, {} {}",
                    if inbounds { "inbounds " } else { "" },
                    pointee,
                    base.ty,
                    self.val(base, names),
                );
                for index in indices {
                    let _ = write!(text, ", {} {}", index.ty, self.val(index, names));
                }
                text
            }
            Op::Call {
                ref callee,
                ref args,
            } => {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|a| format!("{} {}", a.ty, self.val(a, names)))
                    .collect();
                format!(
                    "call {} {}({})",
                    instr.ty,
                    self.val(callee, names),
                    rendered.join(", "),
                )
            }
            Op::Br { dest } => format!("br label %{}", self.block_label(dest)),
            Op::CondBr {
                ref cond,
                then_dest,
                else_dest,
            } => format!(
                "br i1 {}, label %{}, label %{}",
                self.val(cond, names),
                self.block_label(then_dest),
                self.block_label(else_dest),
            ),
            Op::Ret { val: None } => "ret void".to_string(),
            Op::Ret { val: Some(ref v) } => {
                format!("ret {} {}", v.ty, self.val(v, names))
            }
            Op::Phi { ref incoming } => {
                let arms: Vec<String> = incoming
                    .iter()
                    .map(|(v, b)| {
                        format!("[ {}, %{} ]", self.val(v, names), self.block_label(*b))
                    })
                    .collect();
                format!("phi {} {}", instr.ty, arms.join(", "))
            }
        };

        let _ = writeln!(out, "{}{}", lhs, text);
    }

    /// Renders a value reference (without its type).
    fn val(&self, val: &Val, names: &HashMap<InstrId, String>) -> String {
        match val.kind {
            ValKind::Const(Const::Int(_, n)) => n.to_string(),
            ValKind::Const(Const::Float(x)) => format_double(x),
            ValKind::Const(Const::Null(_)) => "null".to_string(),
            ValKind::Instr(id) => match names.get(&id) {
                Some(name) => format!("%{}", name),
                None => format!("%dead{}", id),
            },
            ValKind::Arg(_, index) => format!("%{}", index),
            ValKind::Func(id) => format!("@{}", self.func_name(id)),
            ValKind::Str(id) => {
                let global = &self.globals[id];
                format!(
                    "getelementptr inbounds ([{} x i8], [{} x i8]* @{}, i32 0, i32 0)",
                    global.data.len(),
                    global.data.len(),
                    global.name,
                )
            }
            ValKind::Block(id) => format!("%{}", self.block_label(id)),
        }
    }
}

fn signature(params: &[Type], vararg: bool) -> String {
    let mut rendered: Vec<String> = params.iter().map(|t| t.to_string()).collect();
    if vararg {
        rendered.push("...".to_string());
    }
    rendered.join(", ")
}

/// LLVM's scientific notation for doubles: a fixed
/// six-digit mantissa and a signed two-digit exponent.
fn format_double(x: f64) -> String {
    let formatted = format!("{:.6e}", x);
    match formatted.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => formatted,
    }
}

fn escape_bytes(data: &[u8]) -> String {
    let mut out = String::new();
    for &b in data {
        if (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\{:02X}", b);
        }
    }
    out
}

#[cfg(test)]
mod test {
    use crate::ir::builder::Builder;
    use crate::ir::module::Module;
    use crate::ir::ty::Type;

    #[test]
    fn prints_a_small_function() {
        let mut module = Module::new("snippet");
        let func = module.add_function(
            Some("answer"),
            Type::Func {
                params: vec![],
                ret: Box::new(Type::I32),
                vararg: false,
            },
        );
        let entry = module.create_named_block(func, "entry");
        let mut builder = Builder::new(module);
        builder.set_insert_block(Some(entry));

        let slot = builder.alloca(&Type::I32, Some("test"));
        let one = builder.const_i32(1);
        builder.store(&one, &slot);
        let back = builder.load(&slot);
        builder.ret(&back);

        let text = builder.finish().print_to_string();
        assert!(text.contains("define i32 @answer()"));
        assert!(text.contains("%test = alloca i32"));
        assert!(text.contains("store i32 1, i32* %test"));
        assert!(text.contains("ret i32 %0"));
    }

    #[test]
    fn declarations_and_strings() {
        let mut module = Module::new("snippet");
        module.get_or_insert_function(
            "GC_init",
            Type::Func {
                params: vec![],
                ret: Box::new(Type::Void),
                vararg: false,
            },
        );
        module.add_string_global("hi\n");

        let text = module.print_to_string();
        assert!(text.contains("declare void @GC_init()"));
        assert!(text.contains("c\"hi\\0A\\00\""));
    }

    #[test]
    fn double_formatting() {
        assert_eq!(super::format_double(2.5), "2.500000e+00");
        assert_eq!(super::format_double(0.25), "2.500000e-01");
    }
}
