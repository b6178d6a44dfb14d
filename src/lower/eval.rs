//! The evaluator: where lazy values meet concrete
//! arguments. Functions materialize through a two-pass
//! instantiation protocol (a discardable dry pass to
//! learn the return type, then the real emission); scopes
//! realize into basic blocks at their call or branch
//! site.

use log::debug;

use crate::common::{
    error::{Error, Result},
    span::Span,
};
use crate::construct::attr::set_survey;
use crate::construct::tree::{Expr, ExprKind};
use crate::ir::{Type, Val, ValKind};
use crate::lower::translate::Translator;
use crate::lower::value::{Value, ValueRef};

/// Applies a lazy value to concrete arguments, producing
/// a value backed by real IR. Non-lazy values pass
/// through as copies.
pub fn evaluate(v: &ValueRef, args: Vec<ValueRef>, tr: &mut Translator) -> Result<ValueRef> {
    let (is_lazy, ast) = {
        let b = v.borrow();
        (b.is_lazy, b.ast.clone())
    };
    if !is_lazy {
        return Ok(v.borrow().copy());
    }

    let ast = ast.ok_or_else(|| Error::bug("A lazy value lost its syntax tree", &Span::empty()))?;
    match ast.kind {
        ExprKind::Function { .. } => eval_function(v, &ast, &args, tr),
        ExprKind::Scope(ref lines) => {
            let lines = lines.clone();
            eval_scope(v, &lines, tr)
        }
        _ => Err(Error::bug(
            "A lazy value holds a non-callable node",
            ast.span(),
        )),
    }
}

/// Translates a run of scope instructions into the
/// current block and reports whether control fell through
/// (no `ret` or branch emitted), along with the last
/// line's value.
pub fn apply_bb(lines: &[Expr], tr: &mut Translator) -> Result<(bool, Option<ValueRef>)> {
    let mut last = None;
    for line in lines {
        last = Some(tr.translate(line)?);
    }
    let current = tr
        .builder
        .insert_block()
        .expect("scope body lowered without an insertion point");
    Ok((!tr.module().block_has_terminator(current), last))
}

impl Translator {
    pub(crate) fn apply_bb(&mut self, lines: &[Expr]) -> Result<(bool, Option<ValueRef>)> {
        apply_bb(lines, self)
    }
}

fn eval_function(
    v: &ValueRef,
    ast: &Expr,
    args: &[ValueRef],
    tr: &mut Translator,
) -> Result<ValueRef> {
    let (params, body) = match ast.kind {
        ExprKind::Function {
            ref params,
            ref body,
        } => (params.clone(), body.clone()),
        _ => unreachable!(),
    };

    let stub = match v.borrow().ir {
        Some(Val {
            kind: ValKind::Func(id),
            ..
        }) => id,
        _ => {
            return Err(Error::bug(
                "A lazy function has no placeholder",
                ast.span(),
            ))
        }
    };
    let func_name = tr.module().funcs[stub].name.clone();

    // method dispatch appends the receiver after the
    // declared formals, so one extra argument is fine
    let required = tr.module().funcs[stub].param_types().len();
    if args.len() != required && args.len() != required + 1 {
        return Err(Error::translate(
            &format!(
                "The number of arguments doesn't match: required {} but supplied {}",
                required,
                args.len(),
            ),
            ast.span(),
        ));
    }

    // formal names and any declared types; `#typeof`
    // resolves against the call-site scope
    let mut arg_names = vec![];
    let mut declared = vec![];
    for param in &params {
        let name = match param.kind {
            ExprKind::Identifier(ref name) => name.clone(),
            _ => unreachable!("function formals are identifiers"),
        };
        let ty = if param.attr.has("type") {
            Some(tr.parse_type_attr(param, "type")?)
        } else if let Some(var) = param.attr.get("typeof") {
            Some(typeof_lookup(tr, var, param.span())?)
        } else {
            None
        };
        arg_names.push(name);
        declared.push(ty);
    }
    let declared_ret = if ast.attr.has("rettype") {
        Some(tr.parse_type_attr(ast, "rettype")?)
    } else if let Some(var) = ast.attr.get("rettypeof") {
        Some(typeof_lookup(tr, var, ast.span())?)
    } else {
        None
    };

    // the signature is built from the non-lazy subset of
    // the actual argument types
    let mut alloca_tys = vec![];
    let mut param_tys = vec![];
    for (i, arg) in args.iter().enumerate() {
        let (lazy, fundamental, ty) = {
            let b = arg.borrow();
            (b.is_lazy, b.is_fundamental(), b.ty().cloned())
        };
        let ty = ty.ok_or_else(|| Error::bug("An argument carries no value", ast.span()))?;
        if let Some(Some(expected)) = declared.get(i) {
            if *expected != ty {
                return Err(Error::translate(
                    &format!(
                        "Type mismatch on argument No.{}: expected \"{}\" but supplied \"{}\"",
                        i, expected, ty,
                    ),
                    ast.span(),
                ));
            }
        }
        if !lazy {
            param_tys.push(ty.clone());
        }
        alloca_tys.push(if fundamental {
            ty
        } else {
            ty.pointee().cloned().unwrap_or(ty)
        });
    }

    // -- pass one: the dry (survey) pass --
    // a preliminary void function whose only purpose is
    // to discover the return type; it never survives
    debug!(
        "dry pass for lazy function {:?} with {} argument(s)",
        func_name, args.len(),
    );
    let survey_ty = Type::Func {
        params: param_tys.clone(),
        ret: Box::new(Type::Void),
        vararg: false,
    };
    let survey_fn = tr.module_mut().add_function(None, survey_ty);
    let survey_entry = tr.module_mut().create_named_block(survey_fn, "entry_survey");

    let mark = tr.builder.bookmark();
    let prev_scope = tr.set_scope(Value::new(
        Val {
            kind: ValKind::Block(survey_entry),
            ty: Type::Label,
        },
        ast,
    ));
    tr.builder.set_insert_block(Some(survey_entry));

    let survey_fval = tr.module().func_val(survey_fn);
    let selfptr = tr.builder.alloca(&survey_fval.ty, Some("__self"));
    tr.scope
        .borrow_mut()
        .symbols
        .insert("__self".to_string(), Value::new(selfptr, ast));

    for (i, name) in arg_names.iter().enumerate() {
        let arg = &args[i];
        if arg.borrow().is_lazy {
            tr.scope
                .borrow_mut()
                .symbols
                .insert(name.clone(), arg.clone());
        } else {
            let aptr = tr.builder.alloca(&alloca_tys[i], Some(name.as_str()));
            let bound = arg.borrow().copy_with_ir(Some(aptr));
            tr.scope.borrow_mut().symbols.insert(name.clone(), bound);
        }
    }

    let mut ret_table = None;
    for line in &body {
        let marked = set_survey(line.clone(), true);
        let value = tr.translate(&marked)?;
        if ret_table.is_none() {
            ret_table = value.borrow().ret_table.clone();
        }
    }

    // every return must agree on one type
    let mut ret_type: Option<Type> = None;
    for found in tr.module().ret_types(survey_fn) {
        let found = found.unwrap_or(Type::Void);
        match ret_type {
            None => ret_type = Some(found),
            Some(ref prev) if *prev != found => {
                return Err(Error::translate(
                    "All return values must have the same type",
                    ast.span(),
                ))
            }
            Some(_) => {}
        }
    }
    let ret_type = match ret_type {
        Some(ty) => ty,
        None => {
            tr.builder.ret_void();
            Type::Void
        }
    };
    if let Some(ref expected) = declared_ret {
        if *expected != ret_type {
            return Err(Error::translate(
                &format!(
                    "Return type doesn't match: expected \"{}\" but supplied \"{}\"",
                    expected, ret_type,
                ),
                ast.span(),
            ));
        }
    }

    tr.module_mut().erase_function(survey_fn);

    // -- pass two: the real emission --
    // skipped under an enclosing survey, where only the
    // externally visible prototype is kept
    let final_ty = Type::Func {
        params: param_tys,
        ret: Box::new(ret_type.clone()),
        vararg: false,
    };
    let newfunc;
    if ast.attr.survey {
        newfunc = tr
            .module_mut()
            .add_detached_function(func_name.as_deref(), final_ty);
    } else {
        newfunc = tr
            .module_mut()
            .add_function(func_name.as_deref(), final_ty);
        let entry = tr.module_mut().create_named_block(newfunc, "entry");

        tr.set_scope(Value::new(
            Val {
                kind: ValKind::Block(entry),
                ty: Type::Label,
            },
            ast,
        ));
        tr.builder.set_insert_block(Some(entry));

        let fval = tr.module().func_val(newfunc);
        let selfptr = tr.builder.alloca(&fval.ty, Some("__self"));
        tr.scope
            .borrow_mut()
            .symbols
            .insert("__self".to_string(), Value::new(selfptr.clone(), ast));
        tr.builder.store(&fval, &selfptr);

        let mut position = 0usize;
        for (i, name) in arg_names.iter().enumerate() {
            let arg = &args[i];
            if arg.borrow().is_lazy {
                tr.scope
                    .borrow_mut()
                    .symbols
                    .insert(name.clone(), arg.clone());
                continue;
            }
            let aptr = tr.builder.alloca(&alloca_tys[i], Some(name.as_str()));
            let bound = arg.borrow().copy_with_ir(Some(aptr.clone()));
            tr.scope.borrow_mut().symbols.insert(name.clone(), bound);

            let argv = tr.module().arg_val(newfunc, position);
            let to_store = if argv.ty.is_fundamental() {
                argv
            } else {
                tr.builder.load(&argv)
            };
            tr.builder.store(&to_store, &aptr);
            position += 1;
        }

        for line in &body {
            tr.translate(line)?;
        }
        if ret_type.is_void() {
            tr.builder.ret_void();
        }
    }

    tr.set_scope(prev_scope);
    tr.builder.restore(mark);

    let destv = Value::new(tr.module().func_val(newfunc), ast);
    destv.borrow_mut().ret_table = ret_table;
    Ok(destv)
}

/// Resolves a `#typeof:<name>` attribute by looking the
/// variable up at the call site and taking its IR type.
fn typeof_lookup(tr: &mut Translator, var: &str, span: &Span) -> Result<Type> {
    let probe = Expr::new(ExprKind::Variable(var.to_string()), span.clone());
    let value = tr.translate(&probe)?;
    let ty = value.borrow().ty().cloned();
    ty.ok_or_else(|| {
        Error::translate(
            &format!("\"{}\" names a value with no type", var),
            span,
        )
    })
}

/// Realizes a scope value at its call site: the body
/// lands in a fresh block, control branches into it, and
/// (unless the body already left) falls through to a
/// successor block where translation resumes.
fn eval_scope(v: &ValueRef, lines: &[Expr], tr: &mut Translator) -> Result<ValueRef> {
    let saved = tr.builder.insert_block().ok_or_else(|| {
        Error::bug("A scope was applied without an insertion point", &Span::empty())
    })?;
    let parent = tr.module().blocks[saved].func;

    let nb = tr.module_mut().create_block(parent);
    let theblock = tr.module_mut().create_block(parent);

    tr.builder.set_insert_block(Some(theblock));
    let prev_scope = tr.set_scope(v.clone());
    let (fell_through, last) = tr.apply_bb(lines)?;
    if fell_through {
        tr.builder.br(nb);
    } else {
        tr.module_mut().erase_block(nb);
    }
    tr.set_scope(prev_scope);

    tr.builder.set_insert_block(Some(saved));
    tr.builder.br(theblock);
    if fell_through {
        tr.builder.set_insert_block(Some(nb));
    }

    Ok(last.unwrap_or_else(Value::void))
}
