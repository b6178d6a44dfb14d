use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use log::debug;

use crate::common::{
    error::{Error, Result},
    source::Source,
};
use crate::compiler::parse::Parser;
use crate::construct::tree::{Expr, ExprKind};
use crate::ir::{self, BlockId, Builder, CastTag, Type, Val, ValKind};
use crate::lower::value::{set_parent, Value, ValueRef};

/// The central IR-emitting visitor. Walks the attributed
/// AST and emits into the module through the builder,
/// carrying the current lexical scope as a runtime value
/// whose `symbols` is the local namespace.
pub struct Translator {
    pub(crate) builder: Builder,
    pub(crate) scope: ValueRef,
    /// The first block of the synthetic program entry; the
    /// GC prelude lands there.
    pub(crate) entry_block: BlockId,
    /// Cache of scanned IR imports keyed by resolved path.
    loaded: HashMap<PathBuf, Vec<ir::ScannedFunc>>,
    pub(crate) link_libraries: Vec<String>,
}

impl Translator {
    pub fn new(builder: Builder, entry_block: BlockId) -> Translator {
        Translator {
            builder,
            scope: Value::void(),
            entry_block,
            loaded: HashMap::new(),
            link_libraries: vec![],
        }
    }

    pub fn finish(self) -> (ir::Module, Vec<String>) {
        (self.builder.finish(), self.link_libraries)
    }

    pub(crate) fn module(&self) -> &ir::Module {
        self.builder.module()
    }

    pub(crate) fn module_mut(&mut self) -> &mut ir::Module {
        self.builder.module_mut()
    }

    pub(crate) fn set_scope(&mut self, scope: ValueRef) -> ValueRef {
        std::mem::replace(&mut self.scope, scope)
    }

    /// Translates one expression into a runtime value.
    pub fn translate(&mut self, e: &Expr) -> Result<ValueRef> {
        match e.kind {
            ExprKind::Int(n) => {
                self.reject_const_flags(e, "An integer")?;
                Ok(Value::new(self.builder.const_i32(n), e))
            }
            ExprKind::Float(x) => {
                self.reject_const_flags(e, "A decimal")?;
                Ok(Value::new(self.builder.const_f64(x), e))
            }
            ExprKind::Bool(b) => {
                self.reject_const_flags(e, "A boolean")?;
                Ok(Value::new(self.builder.const_i1(b), e))
            }
            ExprKind::Str(ref s) => {
                self.reject_const_flags(e, "A string")?;
                Ok(Value::new(self.builder.global_string_ptr(s), e))
            }
            ExprKind::Variable(ref name) => self.variable(e, name),
            ExprKind::PreVariable(ref name) => self.pre_variable(e, name),
            // formal names and selectors have no value of
            // their own
            ExprKind::Identifier(_) | ExprKind::StructKey(_) | ExprKind::ArgList(_) => {
                Ok(Value::void())
            }
            ExprKind::Array(ref items) => self.array(e, items),
            ExprKind::Structure(ref members) => self.structure(e, members),
            ExprKind::Function { .. } => self.function(e),
            ExprKind::Scope(_) => self.scope_literal(e),
            ExprKind::Op { .. } => self.translate_op(e),
        }
    }

    fn reject_const_flags(&self, e: &Expr, what: &str) -> Result<()> {
        if e.attr.lval {
            return Err(Error::translate(
                &format!("{} constant is not to be assigned", what),
                &e.attr.span,
            ));
        }
        if e.attr.to_call {
            return Err(Error::translate(
                &format!("{} constant is not to be called", what),
                &e.attr.span,
            ));
        }
        Ok(())
    }

    // -- leaves --

    fn variable(&mut self, e: &Expr, name: &str) -> Result<ValueRef> {
        let existing = self.scope.borrow().symbols.get(name).cloned();
        let vp = match existing {
            None if e.attr.lval => {
                // not found and to be assigned: a
                // declaration-on-first-assignment
                let vp = Value::pending(e);
                vp.borrow_mut().name = name.to_string();
                return Ok(vp);
            }
            None => {
                return Err(Error::translate(
                    &format!("\"{}\" has not declared in this scope", name),
                    &e.attr.span,
                ))
            }
            Some(vp) => vp,
        };

        vp.borrow_mut().name = name.to_string();
        let (is_lazy, fundamental, ir) = {
            let b = vp.borrow();
            (b.is_lazy, b.is_fundamental(), b.ir.clone())
        };

        match ir {
            Some(ref ptr) if !e.attr.lval && !is_lazy && fundamental && ptr.ty.is_pointer() => {
                let loaded = self.builder.load(ptr);
                Ok(vp.borrow().copy_with_ir(Some(loaded)))
            }
            _ => Ok(vp.borrow().copy()),
        }
    }

    fn pre_variable(&mut self, e: &Expr, name: &str) -> Result<ValueRef> {
        if e.attr.lval {
            return Err(Error::translate(
                "Pre-defined variables cannot be assigned",
                &e.attr.span,
            ));
        }

        if let Some(func) = self.module().get_function(name) {
            let val = self.module().func_val(func);
            return Ok(Value::new(val, e));
        }

        match name {
            "import" => {
                if let Some(path) = e.attr.get("m") {
                    let path = path.to_string();
                    self.import_module(&path, e)
                } else if let Some(path) = e.attr.get("ir") {
                    let path = path.to_string();
                    if let Some(lib) = e.attr.get("link") {
                        self.link_libraries.push(lib.to_string());
                    }
                    self.import_ir(&path, e)
                } else if let Some(path) = e.attr.get("c") {
                    let path = path.to_string();
                    if let Some(lib) = e.attr.get("link") {
                        self.link_libraries.push(lib.to_string());
                    }
                    self.import_c_header(&path, e)
                } else {
                    Err(Error::translate(
                        "Import path isn't specified",
                        &e.attr.span,
                    ))
                }
            }
            "self" => {
                let mut rewritten = Expr::new(
                    ExprKind::Variable("__self".to_string()),
                    e.attr.span.clone(),
                );
                rewritten.attr = e.attr.clone();
                self.translate(&rewritten)
            }
            other => Err(Error::translate(
                &format!("Pre-defined variable \"{}\" is not defined", other),
                &e.attr.span,
            )),
        }
    }

    // -- imports --

    fn resolve_import(&self, path: &str, e: &Expr) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            return p;
        }
        match e.attr.span.source {
            Some(ref source) => match source.path.parent() {
                Some(dir) => dir.join(&p),
                None => p,
            },
            None => p,
        }
    }

    /// `@import#m:<path>` — parse the file, reuse the
    /// current module, and return its top-level value.
    /// The imported file starts from an empty scope.
    fn import_module(&mut self, path: &str, e: &Expr) -> Result<ValueRef> {
        let abspath = self.resolve_import(path, e);
        debug!("importing module {}", abspath.display());

        let source = Source::path(&abspath).map_err(|_| {
            Error::translate(&format!("Failed to open {}", path), &e.attr.span)
        })?;
        let ast = Parser::parse(source)?;

        let prev = self.set_scope(Value::void());
        let val = self.translate(&ast);
        self.set_scope(prev);
        val
    }

    /// `@import#ir:<path>` — scan the IR file's externally
    /// linkable functions and present them as an anonymous
    /// structure of function pointers.
    fn import_ir(&mut self, path: &str, e: &Expr) -> Result<ValueRef> {
        let abspath = self.resolve_import(path, e);
        let funcs = match self.loaded.get(&abspath) {
            Some(cached) => cached.clone(),
            None => {
                let text = std::fs::read_to_string(&abspath).map_err(|_| {
                    Error::translate(&format!("Failed to open {}", path), &e.attr.span)
                })?;
                let scanned = ir::scan_declarations(&text).map_err(|msg| {
                    Error::translate(
                        &format!("Error happened during import of llvm ir: {}", msg),
                        &e.attr.span,
                    )
                })?;
                self.loaded.insert(abspath.clone(), scanned.clone());
                scanned
            }
        };
        debug!("importing {} functions from {}", funcs.len(), abspath.display());

        let destv = Value::pending(e);
        let mut field_tys = vec![];
        let mut count = 0u32;
        for func in funcs.iter().filter(|f| !f.name.starts_with("llvm.")) {
            let id = self
                .module_mut()
                .get_or_insert_function(&func.name, func.ty.clone());
            let fval = self.module().func_val(id);
            field_tys.push(fval.ty.clone());

            let member = Value::new(fval, e);
            set_parent(&member, &destv);
            let mut dest = destv.borrow_mut();
            dest.symbols.insert(func.name.clone(), member);
            dest.fields.insert(func.name.clone(), count);
            count += 1;
        }

        let struct_ty = Type::Struct(field_tys);
        let ptr = self.builder.alloca(&struct_ty, None);
        destv.borrow_mut().ir = Some(ptr.clone());

        let fields: Vec<(String, u32)> = destv
            .borrow()
            .fields
            .iter()
            .map(|(k, &v)| (k.clone(), v))
            .collect();
        for (name, index) in fields {
            let member = destv.borrow().symbols[&name].clone();
            let fval = member.borrow().ir.clone().expect("import member has no value");
            let slot = self.builder.struct_gep(&ptr, index);
            self.builder.store(&fval, &slot);
            member.borrow_mut().ir = Some(slot);
        }

        Ok(destv)
    }

    /// `@import#c:<path>` — run the C-header-to-IR helper,
    /// then import the IR it cached.
    fn import_c_header(&mut self, path: &str, e: &Expr) -> Result<ValueRef> {
        let home = std::env::var("HOME").map_err(|_| {
            Error::translate("HOME is not set; cannot cache header imports", &e.attr.span)
        })?;
        let cache_dir = PathBuf::from(home).join(".cache/grackle/h2ir");
        let file_name = PathBuf::from(path)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                Error::translate(&format!("Failed to open {}", path), &e.attr.span)
            })?;
        let mut cached = cache_dir.join(file_name);
        cached.set_extension("ll");

        std::fs::create_dir_all(&cache_dir).map_err(|_| {
            Error::translate("Cannot create the header import cache", &e.attr.span)
        })?;
        let status = Command::new("grackle-h2ir")
            .arg(path)
            .arg(&cached)
            .status();
        match status {
            Ok(status) if status.success() => {}
            _ => {
                return Err(Error::translate(
                    "Error happened during import of a c header",
                    &e.attr.span,
                ))
            }
        }

        self.import_ir(cached.to_str().unwrap_or(path), e)
    }

    // -- composite literals --

    fn array(&mut self, e: &Expr, items: &[Expr]) -> Result<ValueRef> {
        self.reject_const_flags(e, "An array")?;

        if items.is_empty() {
            return Err(Error::translate(
                "An array literal must have at least one element",
                &e.attr.span,
            ));
        }

        let first = self.translate(&items[0])?;
        let elem_ty = {
            let b = first.borrow();
            let ty = b.ty().cloned().ok_or_else(|| {
                Error::translate("An array element has no value", &e.attr.span)
            })?;
            if b.is_fundamental() {
                ty
            } else {
                ty.pointee().cloned().unwrap_or(ty)
            }
        };

        let ary_ty = Type::Array(Box::new(elem_ty.clone()), items.len());
        let ary_ptr = self.builder.alloca(&ary_ty, None);
        let destv = Value::new(ary_ptr.clone(), e);

        let mut slot = 0u32;
        for (i, item) in items.iter().enumerate() {
            let v = if i == 0 {
                first.clone()
            } else {
                self.translate(item)?
            };

            let (is_lazy, fundamental, ty) = {
                let b = v.borrow();
                (b.is_lazy, b.is_fundamental(), b.ty().cloned())
            };
            set_parent(&v, &destv);
            destv.borrow_mut().symbols.insert(i.to_string(), v.clone());

            if is_lazy {
                // lazy elements live in the symbol table
                // only; no memory footprint
                continue;
            }

            let actual = match ty {
                Some(ty) if fundamental => ty,
                Some(ty) => ty.pointee().cloned().unwrap_or(ty),
                None => Type::Void,
            };
            if actual != elem_ty {
                return Err(Error::translate(
                    "all elements of array must have the same type",
                    &e.attr.span,
                ));
            }

            let zero = self.builder.const_i32(0);
            let index = self.builder.const_i32(slot as i32);
            let p = self
                .builder
                .gep(&ary_ptr, vec![zero, index], true)
                .expect("array element gep");
            let dest = Value::new(p.clone(), item);
            if !self.copy_full(&v, &dest, &i.to_string(), Some(p), Some(&destv))? {
                return Err(Error::bug(
                    "Assigned with wrong type during construction of the array",
                    &e.attr.span,
                ));
            }
            slot += 1;
        }

        Ok(destv)
    }

    fn structure(
        &mut self,
        e: &Expr,
        members: &indexmap::IndexMap<String, Expr>,
    ) -> Result<ValueRef> {
        let destv = Value::pending(e);

        let mut field_tys = vec![];
        for (key, sub) in members {
            let vp = self.translate(sub)?;
            let (is_lazy, fundamental, ty) = {
                let b = vp.borrow();
                (b.is_lazy, b.is_fundamental(), b.ty().cloned())
            };
            set_parent(&vp, &destv);
            destv.borrow_mut().symbols.insert(key.clone(), vp);

            if !is_lazy {
                let ty = ty.ok_or_else(|| {
                    Error::translate(
                        &format!("Member \"{}\" has no value", key),
                        &e.attr.span,
                    )
                })?;
                field_tys.push(if fundamental {
                    ty
                } else {
                    ty.pointee().cloned().unwrap_or(ty)
                });
            }
        }

        // structural struct types make layout-identity
        // deduplication automatic
        let struct_ty = Type::Struct(field_tys);
        let ptr = self.builder.alloca(&struct_ty, None);
        destv.borrow_mut().ir = Some(ptr.clone());

        let entries: Vec<(String, ValueRef)> = destv
            .borrow()
            .symbols
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut index = 0u32;
        for (name, vp) in entries {
            if vp.borrow().is_lazy {
                continue;
            }
            destv.borrow_mut().fields.insert(name.clone(), index);
            let p = self.builder.struct_gep(&ptr, index);
            let ast = vp.borrow().ast.clone().unwrap_or_else(|| e.clone());
            let dest = Value::new(p.clone(), &ast);
            if !self.copy_full(&vp, &dest, &name, Some(p), Some(&destv))? {
                return Err(Error::bug(
                    "Assigned with wrong type during construction of the structure",
                    &e.attr.span,
                ));
            }
            index += 1;
        }

        Ok(destv)
    }

    fn function(&mut self, e: &Expr) -> Result<ValueRef> {
        if e.attr.lval {
            return Err(Error::translate(
                "A function constant is not to be assigned",
                &e.attr.span,
            ));
        }

        let (params, body) = match e.kind {
            ExprKind::Function {
                ref params,
                ref body,
            } => (params, body),
            _ => unreachable!(),
        };

        let export = e.attr.get("export").map(|s| s.to_string());
        let eager = params.iter().all(|p| p.attr.has("type"))
            && e.attr.has("rettype")
            && !e.attr.has("lazy");

        if !eager {
            // lazy path: a placeholder of a stub signature;
            // the evaluator builds the real function once
            // the caller supplies concrete argument types
            let stub_ty = Type::Func {
                params: vec![Type::I32; params.len()],
                ret: Box::new(Type::Void),
                vararg: false,
            };
            let stub = self
                .module_mut()
                .add_detached_function(export.as_deref(), stub_ty);
            let val = self.module().func_val(stub);
            return Ok(Value::lazy(val, e));
        }

        // eager path: every type is written down
        let mut arg_types = vec![];
        for param in params {
            arg_types.push(self.parse_type_attr(param, "type")?);
        }
        let ret_type = self.parse_type_attr(e, "rettype")?;

        let func_ty = Type::Func {
            params: arg_types.clone(),
            ret: Box::new(ret_type.clone()),
            vararg: false,
        };
        // under a survey pass the definition must not leak
        // into the final module
        let func = if e.attr.survey {
            self.module_mut()
                .add_detached_function(export.as_deref(), func_ty)
        } else {
            self.module_mut().add_function(export.as_deref(), func_ty)
        };
        let entry = self.module_mut().create_named_block(func, "entry");

        let mark = self.builder.bookmark();
        let scope_val = Value::new(
            Val {
                kind: ValKind::Block(entry),
                ty: Type::Label,
            },
            e,
        );
        let prev_scope = self.set_scope(scope_val);
        self.builder.set_insert_block(Some(entry));

        let fval = self.module().func_val(func);
        let selfptr = self.builder.alloca(&fval.ty, Some("__self"));
        self.scope
            .borrow_mut()
            .symbols
            .insert("__self".to_string(), Value::new(selfptr.clone(), e));
        self.builder.store(&fval, &selfptr);

        for (i, param) in params.iter().enumerate() {
            let pname = match param.kind {
                ExprKind::Identifier(ref name) => name.clone(),
                _ => unreachable!("function formals are identifiers"),
            };
            let aptr = self.builder.alloca(&arg_types[i], Some(pname.as_str()));
            self.scope
                .borrow_mut()
                .symbols
                .insert(pname, Value::new(aptr.clone(), param));
            let argv = self.module().arg_val(func, i);
            let to_store = if argv.ty.is_fundamental() {
                argv
            } else {
                self.builder.load(&argv)
            };
            self.builder.store(&to_store, &aptr);
        }

        for line in body {
            self.translate(line)?;
        }
        if ret_type.is_void() {
            self.builder.ret_void();
        }

        self.set_scope(prev_scope);
        self.builder.restore(mark);

        Ok(Value::new(self.module().func_val(func), e))
    }

    /// Parses a `#type:`/`#rettype:`-style textual type
    /// attribute on `e`.
    pub(crate) fn parse_type_attr(&self, e: &Expr, key: &str) -> Result<Type> {
        let text = e
            .attr
            .get(key)
            .expect("type attribute checked before parsing");
        ir::parse_type(text).map_err(|_| {
            Error::translate(
                &format!("Failed to parse type name \"{}\"", text),
                &e.attr.span,
            )
        })
    }

    fn scope_literal(&mut self, e: &Expr) -> Result<ValueRef> {
        if e.attr.lval {
            return Err(Error::translate(
                "A scope constant is not to be assigned",
                &e.attr.span,
            ));
        }

        // an empty placeholder block; realized into real
        // blocks at call or branch points
        let bb = self.module_mut().create_block(None);
        let destv = Value::lazy(
            Val {
                kind: ValKind::Block(bb),
                ty: Type::Label,
            },
            e,
        );
        destv.borrow_mut().symbols = self.scope.borrow().symbols.clone();
        Ok(destv)
    }

    // -- GC and bulk copies --

    /// Allocates `ty` on the collected heap, arming the GC
    /// prelude on first use: declare `GC_init`/`GC_malloc`,
    /// call `GC_init` at the top of the program entry, and
    /// link the collector. Idempotent per module.
    pub(crate) fn create_gc_malloc(&mut self, ty: &Type) -> Val {
        if !self.link_libraries.iter().any(|l| l == "gc") {
            debug!("arming GC prelude");
            let init = self.builder.declared(
                "GC_init",
                Type::Func {
                    params: vec![],
                    ret: Box::new(Type::Void),
                    vararg: false,
                },
            );
            self.builder.declared(
                "GC_malloc",
                Type::Func {
                    params: vec![Type::I64],
                    ret: Box::new(Type::I8.ptr()),
                    vararg: false,
                },
            );
            let mark = self.builder.bookmark();
            self.builder.set_insert_block(Some(self.entry_block));
            self.builder.call(&init, vec![]);
            self.builder.restore(mark);
            self.link_libraries.push("gc".to_string());
        }

        let size = self.sizeof_type(&ty.clone().ptr());
        let malloc = self.builder.declared(
            "GC_malloc",
            Type::Func {
                params: vec![Type::I64],
                ret: Box::new(Type::I8.ptr()),
                vararg: false,
            },
        );
        let raw = self.builder.call(&malloc, vec![size]);
        self.builder.cast(CastTag::Bitcast, &raw, ty.clone().ptr())
    }

    /// Byte size of a pointer's pointee, computed with the
    /// null-GEP trick:
    /// `ptrtoint (T* getelementptr (T, T* null, i32 1)) to i64`.
    pub(crate) fn sizeof_type(&mut self, ptr_ty: &Type) -> Val {
        let null = Val::const_null(ptr_ty.clone());
        let one = self.builder.const_i32(1);
        let gep = self
            .builder
            .gep(&null, vec![one], false)
            .expect("sizeof over a non-pointer");
        self.builder.cast(CastTag::PtrToInt, &gep, Type::I64)
    }

    fn memcpy_decl(&mut self) -> Val {
        self.builder.declared(
            "llvm.memcpy.p0i8.p0i8.i64",
            Type::Func {
                params: vec![Type::I8.ptr(), Type::I8.ptr(), Type::I64, Type::I1],
                ret: Box::new(Type::Void),
                vararg: false,
            },
        )
    }

    /// Moves `src` into `dest`'s storage and symbol slot.
    /// Fundamental values `store`; aggregates `memcpy` by
    /// computed byte size; lazy values skip memory
    /// entirely and only land in the enclosing symbol
    /// table. Returns false when the types don't line up.
    pub(crate) fn copy_full(
        &mut self,
        src: &ValueRef,
        dest: &ValueRef,
        name: &str,
        newv: Option<Val>,
        defp: Option<&ValueRef>,
    ) -> Result<bool> {
        let parent = dest.borrow().parent();
        let lval_opt = newv.or_else(|| dest.borrow().ir.clone());
        let (src_lazy, src_fund, rval) = {
            let b = src.borrow();
            (b.is_lazy, b.is_fundamental(), b.ir.clone())
        };

        let mut stored = lval_opt.clone();
        if !src_lazy {
            let lval = match lval_opt {
                Some(lval) => lval,
                None => return Ok(false),
            };
            let rval = match rval {
                Some(rval) => rval,
                None => return Ok(false),
            };
            let pointee = match lval.ty.pointee() {
                Some(pointee) => pointee.clone(),
                None => return Ok(false),
            };
            let expected = if src_fund { pointee } else { lval.ty.clone() };
            if expected != rval.ty {
                return Ok(false);
            }

            if src_fund {
                self.builder.store(&rval, &lval);
            } else {
                let memcpy = self.memcpy_decl();
                let dst8 = self.builder.cast(CastTag::Bitcast, &lval, Type::I8.ptr());
                let src8 = self.builder.cast(CastTag::Bitcast, &rval, Type::I8.ptr());
                let size = self.sizeof_type(&rval.ty);
                let not_volatile = self.builder.const_i1(false);
                self.builder
                    .call(&memcpy, vec![dst8, src8, size, not_volatile]);
            }
            stored = Some(lval);
        }

        if !name.is_empty() {
            let table = parent
                .or_else(|| defp.cloned())
                .unwrap_or_else(|| self.scope.clone());
            let copied = if src_lazy {
                src.borrow().copy()
            } else {
                src.borrow().copy_with_ir(stored)
            };
            table.borrow_mut().symbols.insert(name.to_string(), copied);
        }
        Ok(true)
    }
}
