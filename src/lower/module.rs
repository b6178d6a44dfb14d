use log::debug;

use crate::common::error::{Error, Result};
use crate::construct::tree::Expr;
use crate::ir::{self, Builder, Type, ValKind};
use crate::lower::eval::evaluate;
use crate::lower::translate::Translator;
use crate::lower::value::Value;

/// The compiled form of one source unit: the emitted IR
/// module plus the linker hints collected from imports
/// and the GC/math preludes.
#[derive(Debug)]
pub struct Program {
    module: ir::Module,
    link_libraries: Vec<String>,
}

impl Program {
    /// Lowers a parsed program. Builds the synthetic entry
    /// `main(i32, i8**) -> i32`, translates the top-level
    /// expression, evaluates it against the entry's
    /// arguments, and calls the resulting function (a void
    /// result returns 0).
    pub fn create(ast: &Expr, name: &str) -> Result<Program> {
        debug!("lowering module {}", name);

        let mut module = ir::Module::new(name);
        let main_ty = Type::Func {
            params: vec![Type::I32, Type::I8.ptr().ptr()],
            ret: Box::new(Type::I32),
            vararg: false,
        };
        let main = module.add_function(Some("main"), main_ty);
        let entry = module.create_named_block(main, "entry");

        let mut builder = Builder::new(module);
        builder.set_insert_block(Some(entry));
        let mut tr = Translator::new(builder, entry);

        let top = tr.translate(ast)?;

        let top_ir = top.borrow().ir.clone();
        let top_ir = match top_ir {
            Some(val) if matches!(val.kind, ValKind::Func(_)) => val,
            _ => {
                return Err(Error::translate(
                    "Top-level value must be function",
                    ast.span(),
                ))
            }
        };

        // a top-level function with formals receives the
        // entry's arguments
        let takes_args = match top_ir.ty.pointee() {
            Some(Type::Func { params, .. }) => !params.is_empty(),
            _ => false,
        };
        let (arg_irs, arg_values) = if takes_args {
            let argc = tr.module().arg_val(main, 0);
            let argv = tr.module().arg_val(main, 1);
            (
                vec![argc.clone(), argv.clone()],
                vec![Value::wrap(argc), Value::wrap(argv)],
            )
        } else {
            (vec![], vec![])
        };

        let evaluated = evaluate(&top, arg_values, &mut tr)?;
        let callee = evaluated.borrow().ir.clone().ok_or_else(|| {
            Error::bug("The evaluated top-level function has no value", ast.span())
        })?;

        let ret = tr.builder.call(&callee, arg_irs);
        if ret.ty.is_void() {
            let zero = tr.builder.const_i32(0);
            tr.builder.ret(&zero);
        } else {
            tr.builder.ret(&ret);
        }

        let (module, link_libraries) = tr.finish();
        Ok(Program {
            module,
            link_libraries,
        })
    }

    /// Pretty-printed IR text.
    pub fn irgen(&self) -> String {
        self.module.print_to_string()
    }

    pub fn optimize(&mut self, level: u8, size_level: u8) {
        self.module.optimize(level, size_level);
    }

    pub fn verify(&self) -> Result<()> {
        self.module.verify().map_err(|msg| Error::internal(&msg))
    }

    pub fn set_target_triple(&mut self, triple: &str) {
        self.module.target_triple = Some(triple.to_string());
    }

    /// Libraries the final link step should pull in,
    /// collected from `@import … #link:` and the GC/math
    /// preludes.
    pub fn link_libraries(&self) -> &[String] {
        &self.link_libraries
    }
}
