//! Operator dispatch: structure-based method lookup for
//! customizable operators, then the primitive lowerings.

use crate::common::error::{Error, Result};
use crate::construct::attr::set_lval;
use crate::construct::tree::{Expr, ExprKind, OpKind};
use crate::ir::{BinTag, CastTag, Cond, Type, Val};
use crate::lower::eval::evaluate;
use crate::lower::translate::Translator;
use crate::lower::value::{Value, ValueRef};

/// Collects the IR of a concrete (non-lazy) argument.
fn push_concrete(v: &ValueRef, arg_irs: &mut Vec<Val>) {
    let b = v.borrow();
    if !b.is_lazy {
        if let Some(ref ir) = b.ir {
            arg_irs.push(ir.clone());
        }
    }
}

impl Translator {
    pub(crate) fn translate_op(&mut self, e: &Expr) -> Result<ValueRef> {
        let (kind, args) = match e.kind {
            ExprKind::Op { kind, ref args } => (kind, args.clone()),
            _ => unreachable!("translate_op on a non-operator node"),
        };

        use OpKind::*;
        match kind {
            Assign => {
                let lhs = self.translate(&args[0])?;
                let rhs = self.translate(&args[1])?;
                self.apply_assign(e, &args[0], &lhs, &rhs)
            }
            Ret => {
                let v = self.translate(&args[0])?;
                self.apply_ret(e, &v)
            }
            Lnot | Inot => {
                let v = self.translate(&args[0])?;
                self.apply_unary(e, kind, &v)
            }
            // rewritten away during parsing
            Inc | Dec => Err(Error::bug(
                "An increment operator survived parsing",
                &e.attr.span,
            )),
            Cond => self.apply_cond(e, &args),
            Call => {
                let callee = self.translate(&args[0])?;
                match self.struct_method(&callee, kind.symbol()) {
                    Some(method) => {
                        self.structure_method_call(e, &callee, &method, &args[1..])
                    }
                    None => self.apply_call(e, &args, &callee),
                }
            }
            At => {
                let lhs = self.translate(&args[0])?;
                match self.struct_method(&lhs, kind.symbol()) {
                    Some(method) => self.structure_method_call(e, &lhs, &method, &args[1..]),
                    None => {
                        let rhs = self.translate(&args[1])?;
                        self.apply_at(e, &lhs, &rhs)
                    }
                }
            }
            Dot | Odot | Adot => {
                let lhs = self.translate(&args[0])?;
                match self.struct_method(&lhs, kind.symbol()) {
                    Some(method) => self.structure_method_call(e, &lhs, &method, &args[1..]),
                    None => self.apply_dot(e, kind, &lhs, &args[1]),
                }
            }
            // the arithmetic/compare family dispatches
            // through structure receivers
            Add | Sub | Mul | Div | Rem | Pow | Eeq | Neq | Gt | Lt | Gtq | Ltq => {
                let lhs = self.translate(&args[0])?;
                match self.struct_method(&lhs, kind.symbol()) {
                    Some(method) => self.structure_method_call(e, &lhs, &method, &args[1..]),
                    None => {
                        let rhs = self.translate(&args[1])?;
                        self.apply_binary(e, kind, &lhs, &rhs)
                    }
                }
            }
            Shl | Shr | Iand | Ior | Ixor | Land | Lor => {
                let lhs = self.translate(&args[0])?;
                let rhs = self.translate(&args[1])?;
                self.apply_binary(e, kind, &lhs, &rhs)
            }
        }
    }

    /// Looks up an operator overload on a structure
    /// receiver: a member whose name is the operator's
    /// textual symbol.
    fn struct_method(&self, receiver: &ValueRef, symbol: &str) -> Option<ValueRef> {
        let b = receiver.borrow();
        if b.is_struct() {
            b.symbols.get(symbol).cloned()
        } else {
            None
        }
    }

    /// Rewrites a customizable operator into a method
    /// invocation: remaining operands become arguments
    /// (arglists unpack), the receiver rides along as the
    /// final argument, and the callee's `ret_table` (if
    /// any) transfers onto the result.
    fn structure_method_call(
        &mut self,
        e: &Expr,
        receiver: &ValueRef,
        method: &ValueRef,
        rest: &[Expr],
    ) -> Result<ValueRef> {
        let mut arg_values = vec![];
        let mut arg_irs = vec![];
        for operand in rest {
            if let Some(items) = operand.as_arglist() {
                for item in items {
                    let v = self.translate(item)?;
                    push_concrete(&v, &mut arg_irs);
                    arg_values.push(v);
                }
            } else {
                let v = self.translate(operand)?;
                push_concrete(&v, &mut arg_irs);
                arg_values.push(v);
            }
        }

        arg_values.push(receiver.clone());
        if let Some(ir) = receiver.borrow().ir.clone() {
            arg_irs.push(ir);
        }

        let evaluated = evaluate(method, arg_values, self)?;
        let (callee, ret_table) = {
            let b = evaluated.borrow();
            (b.ir.clone(), b.ret_table.clone())
        };
        let callee = match callee {
            Some(callee) if matches!(callee.ty.pointee(), Some(Type::Func { .. })) => callee,
            Some(callee) => {
                return Err(Error::translate(
                    &format!(
                        "Cannot call a value which is not a function pointer (type: {})",
                        callee.ty,
                    ),
                    &e.attr.span,
                ))
            }
            None => {
                return Err(Error::translate(
                    "Cannot call a member with no value",
                    &e.attr.span,
                ))
            }
        };

        let call = self.builder.call(&callee, arg_irs);
        let destv = Value::new(call, e);
        if let Some(ref table) = ret_table {
            destv.borrow_mut().apply_ret_table(table);
        }
        Ok(destv)
    }

    // -- primitive lowerings --

    fn ir_of(&self, v: &ValueRef, e: &Expr) -> Result<Val> {
        v.borrow().ir.clone().ok_or_else(|| {
            Error::translate("Cannot use a void value here", &e.attr.span)
        })
    }

    /// Promotes an integer operand to double when the
    /// other side already is one.
    fn promote(&mut self, v: &Val) -> Val {
        if v.ty.is_double() {
            v.clone()
        } else {
            self.builder.cast(CastTag::SiToFp, v, Type::Double)
        }
    }

    fn apply_binary(
        &mut self,
        e: &Expr,
        kind: OpKind,
        lhs: &ValueRef,
        rhs: &ValueRef,
    ) -> Result<ValueRef> {
        let l = self.ir_of(lhs, e)?;
        let r = self.ir_of(rhs, e)?;

        use OpKind::*;
        let result = match kind {
            Add | Sub | Mul | Div | Rem => {
                let float = l.ty.is_double() || r.ty.is_double();
                if float {
                    let l = self.promote(&l);
                    let r = self.promote(&r);
                    let tag = match kind {
                        Add => BinTag::FAdd,
                        Sub => BinTag::FSub,
                        Mul => BinTag::FMul,
                        Div => BinTag::FDiv,
                        _ => BinTag::FRem,
                    };
                    self.builder.binary(tag, &l, &r)
                } else {
                    let tag = match kind {
                        Add => BinTag::Add,
                        Sub => BinTag::Sub,
                        Mul => BinTag::Mul,
                        Div => BinTag::SDiv,
                        _ => BinTag::SRem,
                    };
                    self.builder.binary(tag, &l, &r)
                }
            }
            Pow => return self.apply_pow(e, &l, &r),
            Shl => self.builder.binary(BinTag::Shl, &l, &r),
            Shr => self.builder.binary(BinTag::LShr, &l, &r),
            Iand => self.builder.binary(BinTag::And, &l, &r),
            Ior => self.builder.binary(BinTag::Or, &l, &r),
            Ixor => self.builder.binary(BinTag::Xor, &l, &r),
            Land | Lor => {
                let lz = self.builder.zero_of(&l.ty);
                let rz = self.builder.zero_of(&r.ty);
                let lb = self.builder.icmp(crate::ir::Cond::Ne, &l, &lz);
                let rb = self.builder.icmp(crate::ir::Cond::Ne, &r, &rz);
                let tag = if kind == Land { BinTag::And } else { BinTag::Or };
                self.builder.binary(tag, &lb, &rb)
            }
            Eeq | Neq | Gt | Lt | Gtq | Ltq => {
                let cond = match kind {
                    Eeq => crate::ir::Cond::Eq,
                    Neq => crate::ir::Cond::Ne,
                    Gt => crate::ir::Cond::Sgt,
                    Lt => crate::ir::Cond::Slt,
                    Gtq => crate::ir::Cond::Sge,
                    _ => crate::ir::Cond::Sle,
                };
                self.builder.icmp(cond, &l, &r)
            }
            _ => {
                return Err(Error::bug(
                    "A non-binary operator reached the binary lowering",
                    &e.attr.span,
                ))
            }
        };

        Ok(Value::new(result, e))
    }

    /// `**` lowers to the pow intrinsics: an integer
    /// exponent calls the integer-pow variant and converts
    /// the result back to an integer.
    fn apply_pow(&mut self, e: &Expr, l: &Val, r: &Val) -> Result<ValueRef> {
        if !self.link_libraries.iter().any(|lib| lib == "m") {
            self.link_libraries.push("m".to_string());
        }

        let base = self.promote(l);
        let result = if r.ty.is_integer() {
            let powi = self.builder.declared(
                "llvm.powi.f64.i32",
                Type::Func {
                    params: vec![Type::Double, Type::I32],
                    ret: Box::new(Type::Double),
                    vararg: false,
                },
            );
            let raw = self.builder.call(&powi, vec![base, r.clone()]);
            self.builder.cast(CastTag::FpToSi, &raw, r.ty.clone())
        } else {
            let pow = self.builder.declared(
                "llvm.pow.f64",
                Type::Func {
                    params: vec![Type::Double, Type::Double],
                    ret: Box::new(Type::Double),
                    vararg: false,
                },
            );
            self.builder.call(&pow, vec![base, r.clone()])
        };

        Ok(Value::new(result, e))
    }

    fn apply_unary(&mut self, e: &Expr, kind: OpKind, v: &ValueRef) -> Result<ValueRef> {
        let operand = self.ir_of(v, e)?;
        let result = match kind {
            OpKind::Lnot => {
                let zero = self.builder.zero_of(&operand.ty);
                let nonzero = self.builder.icmp(Cond::Ne, &operand, &zero);
                let truth = self.builder.const_i1(true);
                self.builder.binary(BinTag::Xor, &nonzero, &truth)
            }
            OpKind::Inot => {
                let ones = Val::const_int(operand.ty.clone(), -1);
                self.builder.binary(BinTag::Xor, &operand, &ones)
            }
            _ => unreachable!(),
        };
        Ok(Value::new(result, e))
    }

    /// `|>` emits a `ret` and hands back a void value
    /// carrying the operand's symbol/field snapshot, so
    /// callers can rebuild the returned aggregate's
    /// accessor map.
    fn apply_ret(&mut self, _e: &Expr, v: &ValueRef) -> Result<ValueRef> {
        match v.borrow().ir {
            Some(ref val) => self.builder.ret(val),
            None => self.builder.ret_void(),
        }
        let ret = Value::void();
        ret.borrow_mut().ret_table = Some(v.borrow().make_ret_table());
        Ok(ret)
    }

    pub(crate) fn apply_assign(
        &mut self,
        e: &Expr,
        lhs_ast: &Expr,
        lhs: &ValueRef,
        rhs: &ValueRef,
    ) -> Result<ValueRef> {
        if rhs.borrow().is_void() {
            return Err(Error::translate(
                "Cannot assign the value of void type",
                &e.attr.span,
            ));
        }

        let name = lhs.borrow().name.clone();
        let rhs_lazy = rhs.borrow().is_lazy;

        if lhs.borrow().ir.is_none() && !rhs_lazy {
            // first appearance: allocate storage
            if let Some(parent) = lhs.borrow().parent() {
                let message = if parent.borrow().is_struct() {
                    "Variadic structure: This feature is not supported yet"
                } else {
                    "Variadic array: This feature is not supported yet"
                };
                return Err(Error::translate(message, &e.attr.span));
            }

            if !lhs_ast.is_variable() {
                return Err(Error::bug(
                    "Assigning to a non-variable expression with no parent",
                    &e.attr.span,
                ));
            }

            let rval = self.ir_of(rhs, e)?;
            let fundamental = rhs.borrow().is_fundamental();
            let thety = if fundamental {
                rval.ty.clone()
            } else {
                rval.ty.pointee().cloned().unwrap_or_else(|| rval.ty.clone())
            };
            let storage = if lhs_ast.attr.has("heap") {
                self.create_gc_malloc(&thety)
            } else {
                self.builder.alloca(&thety, Some(name.as_str()))
            };
            lhs.borrow_mut().ir = Some(storage);
        }

        let newv = lhs.borrow().ir.clone();
        if !self.copy_full(rhs, lhs, &name, newv, None)? {
            let lty = lhs
                .borrow()
                .ty()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "void".to_string());
            let rty = rhs
                .borrow()
                .ty()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "void".to_string());
            return Err(Error::translate(
                &format!(
                    "Cannot assign to the value of incompatible type (lval: {}, rval: {})",
                    lty, rty,
                ),
                &e.attr.span,
            ));
        }

        Ok(rhs.clone())
    }

    fn apply_call(&mut self, e: &Expr, args: &[Expr], callee: &ValueRef) -> Result<ValueRef> {
        let is_adot = args[0].as_op(OpKind::Adot).is_some();
        let is_odot = is_adot || args[0].as_op(OpKind::Odot).is_some();
        let receiver_ast = if is_adot {
            args[0].as_op(OpKind::Adot).map(|ops| ops[0].clone())
        } else {
            args[0].as_op(OpKind::Odot).map(|ops| ops[0].clone())
        };

        let arglist = args[1].as_arglist().ok_or_else(|| {
            Error::bug("A call operator without an arglist operand", &e.attr.span)
        })?;

        let callee_ir = self.ir_of(callee, e)?;

        // a scope value: realize it right here
        if callee_ir.ty.is_label() {
            if is_odot {
                return Err(Error::translate(
                    "Calling scope with odot operator is not allowed",
                    &e.attr.span,
                ));
            }
            if !arglist.is_empty() {
                return Err(Error::translate(
                    "Calling scope with arguments is not allowed",
                    &e.attr.span,
                ));
            }
            return evaluate(callee, vec![], self);
        }

        let callee_lazy = callee.borrow().is_lazy;
        let mut arg_irs = vec![];
        let destv;

        if !callee_lazy {
            // a concrete function pointer: a C-style call
            let (params, vararg) = match callee_ir.ty.pointee() {
                Some(Type::Func {
                    params, vararg, ..
                }) => (params.clone(), *vararg),
                Some(_) => {
                    return Err(Error::translate(
                        &format!(
                            "Cannot call a value which is not a function pointer (type: {})",
                            callee_ir.ty,
                        ),
                        &e.attr.span,
                    ))
                }
                None => {
                    return Err(Error::translate(
                        &format!("Cannot call a non-pointer value (type: {})", callee_ir.ty),
                        &e.attr.span,
                    ))
                }
            };

            if arglist.len() != params.len() && !vararg {
                return Err(Error::translate(
                    &format!(
                        "The number of arguments doesn't match: required {} but supplied {}",
                        params.len(),
                        arglist.len(),
                    ),
                    &e.attr.span,
                ));
            }
            if vararg && arglist.len() < params.len() {
                return Err(Error::translate(
                    &format!(
                        "The number of arguments doesn't match: required at least {} but supplied {}",
                        params.len(),
                        arglist.len(),
                    ),
                    &e.attr.span,
                ));
            }

            for (i, arg_ast) in arglist.iter().enumerate() {
                let rv = self.translate(arg_ast)?;
                if rv.borrow().is_lazy {
                    return Err(Error::translate(
                        "Cannot pass a lazy value to c-style functions",
                        &e.attr.span,
                    ));
                }
                let ir = self.ir_of(&rv, e)?;
                if !vararg && ir.ty != params[i] {
                    return Err(Error::translate(
                        &format!(
                            "Type mismatch on argument No.{}: expected \"{}\" but supplied \"{}\"",
                            i, params[i], ir.ty,
                        ),
                        &e.attr.span,
                    ));
                }
                arg_irs.push(ir);
            }

            if is_odot {
                if vararg {
                    return Err(Error::translate(
                        "Cannot pass an object receiver to a variadic function",
                        &e.attr.span,
                    ));
                }
                let parent = callee.borrow().parent().ok_or_else(|| {
                    Error::bug("An objective call lost its receiver", &e.attr.span)
                })?;
                let parent_ir = self.ir_of(&parent, e)?;
                arg_irs.push(parent_ir);
            }

            let call = self.builder.call(&callee_ir, arg_irs);
            destv = Value::new(call, e);
        } else {
            // a lazy callable: materialize a concrete
            // function from the actual argument types
            let mut arg_values = vec![];
            for arg_ast in arglist {
                let rv = self.translate(arg_ast)?;
                push_concrete(&rv, &mut arg_irs);
                arg_values.push(rv);
            }
            if is_odot {
                let receiver_ast = receiver_ast.as_ref().ok_or_else(|| {
                    Error::bug("An objective call lost its receiver", &e.attr.span)
                })?;
                let receiver = self.translate(receiver_ast)?;
                let ir = self.ir_of(&receiver, e)?;
                arg_irs.push(ir);
                arg_values.push(receiver);
            }

            let evaluated = evaluate(callee, arg_values, self)?;
            let (tocall, ret_table) = {
                let b = evaluated.borrow();
                (b.ir.clone(), b.ret_table.clone())
            };
            let tocall = tocall.ok_or_else(|| {
                Error::bug("An evaluated callable has no value", &e.attr.span)
            })?;

            let call = self.builder.call(&tocall, arg_irs);
            destv = Value::new(call, e);
            if let Some(ref table) = ret_table {
                destv.borrow_mut().apply_ret_table(table);
            }
        }

        // `.=` writes the call result back into the base
        if is_adot && !e.attr.survey {
            let receiver_ast = receiver_ast.ok_or_else(|| {
                Error::bug("An assigning call lost its receiver", &e.attr.span)
            })?;
            let lvaled = set_lval(receiver_ast, true);
            let lhs = self.translate(&lvaled)?;
            return self.apply_assign(e, &lvaled, &lhs, &destv);
        }

        Ok(destv)
    }

    fn apply_at(&mut self, e: &Expr, lhs: &ValueRef, rhs: &ValueRef) -> Result<ValueRef> {
        let r = self.ir_of(rhs, e)?;
        let rval = if r.ty.is_pointer() {
            self.builder.load(&r)
        } else {
            r.clone()
        };
        let lval = self.ir_of(lhs, e)?;

        if !rval.ty.is_integer() {
            return Err(Error::translate(
                &format!("Array's index must be integer, not {}", rval.ty),
                &e.attr.span,
            ));
        }
        let pointee = match lval.ty.pointee() {
            Some(pointee) => pointee.clone(),
            None => {
                return Err(Error::translate(
                    &format!("Cannot get element from non-pointer type {}", lval.ty),
                    &e.attr.span,
                ))
            }
        };

        if let (Some(index), true) = (r.as_const_int(), pointee.is_array()) {
            // constant index into a fixed-size array: use
            // the cached child value
            let key = index.to_string();
            let child = lhs.borrow().symbols.get(&key).cloned().ok_or_else(|| {
                Error::translate(
                    &format!("Index {} is out of range.", index),
                    &e.attr.span,
                )
            })?;

            let child_lazy = child.borrow().is_lazy;
            if !child_lazy {
                let zero = self.builder.const_i32(0);
                let idx = self.builder.const_i32(index as i32);
                let p = self
                    .builder
                    .gep(&lval, vec![zero, idx], true)
                    .expect("constant array index gep");
                child.borrow_mut().ir = Some(p);
            }
            child.borrow_mut().name = key;

            let (fundamental, ir) = {
                let b = child.borrow();
                (b.is_fundamental(), b.ir.clone())
            };
            if e.attr.lval || child_lazy || !fundamental {
                Ok(child.borrow().copy())
            } else {
                let loaded = self.builder.load(ir.as_ref().expect("indexed element"));
                Ok(child.borrow().copy_with_ir(Some(loaded)))
            }
        } else {
            // dynamic index, or a pointer-to-pointer base
            let ep = if pointee.is_array() {
                let first_lazy = lhs
                    .borrow()
                    .symbols
                    .first()
                    .map(|(_, v)| v.borrow().is_lazy)
                    .unwrap_or(false);
                if first_lazy {
                    return Err(Error::translate(
                        "Getting value from an array which contains lazy value with an index of non-constant value",
                        &e.attr.span,
                    ));
                }
                let zero = self.builder.const_i32(0);
                self.builder
                    .gep(&lval, vec![zero, rval], true)
                    .expect("dynamic array index gep")
            } else {
                match self.builder.gep(&lval, vec![rval], false) {
                    Some(ep) => ep,
                    None => {
                        return Err(Error::translate(
                            &format!(
                                "Cannot get element from incompatible type {}",
                                lval.ty,
                            ),
                            &e.attr.span,
                        ))
                    }
                }
            };

            let elem = ep.ty.pointee().cloned().unwrap_or(Type::Void);
            if e.attr.lval || elem.is_struct() || elem.is_array() {
                Ok(Value::new(ep, e))
            } else {
                let loaded = self.builder.load(&ep);
                Ok(Value::new(loaded, e))
            }
        }
    }

    fn apply_dot(
        &mut self,
        e: &Expr,
        kind: OpKind,
        lhs: &ValueRef,
        key: &Expr,
    ) -> Result<ValueRef> {
        if matches!(kind, OpKind::Odot | OpKind::Adot) && !e.attr.to_call {
            return Err(Error::translate(
                "Objective dot operator without call operator",
                &e.attr.span,
            ));
        }

        let id = key.as_struct_key().ok_or_else(|| {
            Error::bug("The rhs of a dot operator must be a struct key", &e.attr.span)
        })?;

        let mut lval = self.ir_of(lhs, e)?;
        if !lval.ty.is_pointer() {
            return Err(Error::translate(
                &format!("Cannot get \"{}\" from non-pointer type {}", id, lval.ty),
                &e.attr.span,
            ));
        }
        // auto-load through one level of indirection
        if lval.ty.pointee().map(Type::is_pointer).unwrap_or(false) {
            lval = self.builder.load(&lval);
        }
        if !lval.ty.pointee().map(Type::is_struct).unwrap_or(false) {
            return Err(Error::translate(
                &format!("Cannot get \"{}\" from non-structure type {}", id, lval.ty),
                &e.attr.span,
            ));
        }

        let elm = lhs.borrow().symbols.get(id).cloned().ok_or_else(|| {
            Error::translate(
                &format!("No member named \"{}\" in the structure", id),
                &e.attr.span,
            )
        })?;

        let elm_lazy = elm.borrow().is_lazy;
        if !elm_lazy {
            let index = lhs.borrow().fields.get(id).copied().ok_or_else(|| {
                Error::bug("A concrete member is missing its field index", &e.attr.span)
            })?;
            let ptr = self.builder.struct_gep(&lval, index);
            elm.borrow_mut().ir = Some(ptr);
        }
        elm.borrow_mut().name = id.to_string();

        let (fundamental, ir) = {
            let b = elm.borrow();
            (b.is_fundamental(), b.ir.clone())
        };
        if e.attr.lval || elm_lazy || !fundamental {
            Ok(elm.borrow().copy())
        } else {
            let loaded = self.builder.load(ir.as_ref().expect("addressed member"));
            Ok(elm.borrow().copy_with_ir(Some(loaded)))
        }
    }

    fn apply_cond(&mut self, e: &Expr, args: &[Expr]) -> Result<ValueRef> {
        let cond_v = self.translate(&args[0])?;
        if cond_v.borrow().is_lazy {
            return Err(Error::translate(
                "Conditional operator with lazy value is not supported",
                &e.attr.span,
            ));
        }
        let cond_ir = self.ir_of(&cond_v, e)?;

        let then_v = self.translate(&args[1])?;
        let else_v = self.translate(&args[2])?;

        let then_ty = then_v.borrow().ty().cloned();
        let else_ty = else_v.borrow().ty().cloned();
        if then_ty != else_ty {
            return Err(Error::translate(
                &format!(
                    "Conditional operator with incompatible value types (lhs: {}, rhs: {})",
                    then_ty.map(|t| t.to_string()).unwrap_or_else(|| "void".into()),
                    else_ty.map(|t| t.to_string()).unwrap_or_else(|| "void".into()),
                ),
                &e.attr.span,
            ));
        }

        if then_ty.as_ref().map(Type::is_label).unwrap_or(false) {
            self.cond_scopes(e, &cond_ir, &then_v, &else_v)
        } else {
            self.cond_values(e, args, &cond_ir, &then_v, &else_v)
        }
    }

    /// Both arms are scope values: realize each into its
    /// own block, branch, and merge. The merge block only
    /// exists when at least one arm can fall through.
    fn cond_scopes(
        &mut self,
        e: &Expr,
        cond_ir: &Val,
        then_v: &ValueRef,
        else_v: &ValueRef,
    ) -> Result<ValueRef> {
        let parent = self.current_function(e)?;
        let thenbb = self.module_mut().create_block(Some(parent));
        let elsebb = self.module_mut().create_block(Some(parent));
        let mergebb = self.module_mut().create_block(Some(parent));

        let mark = self.builder.bookmark();
        let mut merge_unused = true;

        for (arm, block) in [(then_v, thenbb), (else_v, elsebb)] {
            let lines = match arm.borrow().ast {
                Some(Expr {
                    kind: ExprKind::Scope(ref lines),
                    ..
                }) => lines.clone(),
                _ => {
                    return Err(Error::bug(
                        "Applying a non-scope value as a scope",
                        &e.attr.span,
                    ))
                }
            };

            self.builder.set_insert_block(Some(block));
            let prev = self.set_scope(arm.clone());
            let (fell_through, _) = self.apply_bb(&lines)?;
            self.set_scope(prev);
            if fell_through {
                self.builder.br(mergebb);
                merge_unused = false;
            }
        }

        if merge_unused {
            self.module_mut().erase_block(mergebb);
        }

        self.builder.restore(mark);
        self.builder.cond_br(cond_ir, thenbb, elsebb);
        if !merge_unused {
            self.builder.set_insert_block(Some(mergebb));
        }

        Ok(Value::void())
    }

    /// Both arms are plain values of the same type: route
    /// them through a stack slot and load the winner in
    /// the merge block.
    fn cond_values(
        &mut self,
        e: &Expr,
        args: &[Expr],
        cond_ir: &Val,
        then_v: &ValueRef,
        else_v: &ValueRef,
    ) -> Result<ValueRef> {
        if then_v.borrow().is_lazy || else_v.borrow().is_lazy {
            return Err(Error::translate(
                "Conditional operator with lazy value is currently not supported",
                &e.attr.span,
            ));
        }

        {
            let t = then_v.borrow();
            let f = else_v.borrow();
            if !t.fields.keys().eq(f.fields.keys()) {
                return Err(Error::translate(
                    "Conditional operator with different fields",
                    &e.attr.span,
                ));
            }
        }

        let value_ty = self.ir_of(then_v, e)?.ty;
        let slot_ty = if e.attr.lval {
            value_ty.ptr()
        } else {
            value_ty
        };

        let parent = self.current_function(e)?;
        let mark = self.builder.bookmark();
        let destlv = self.builder.alloca(&slot_ty, None);
        let thenbb = self.module_mut().create_block(Some(parent));
        let elsebb = self.module_mut().create_block(Some(parent));
        let mergebb = self.module_mut().create_block(Some(parent));

        // for an l-value result, both arms re-translate as
        // addresses
        let (then_out, else_out) = if e.attr.lval {
            let lvaled_then = set_lval(args[1].clone(), true);
            let lvaled_else = set_lval(args[2].clone(), true);
            (self.translate(&lvaled_then)?, self.translate(&lvaled_else)?)
        } else {
            (then_v.clone(), else_v.clone())
        };
        let then_ir = self.ir_of(&then_out, e)?;
        let else_ir = self.ir_of(&else_out, e)?;

        self.builder.set_insert_block(Some(thenbb));
        self.builder.store(&then_ir, &destlv);
        self.builder.br(mergebb);

        self.builder.set_insert_block(Some(elsebb));
        self.builder.store(&else_ir, &destlv);
        self.builder.br(mergebb);

        self.builder.restore(mark);
        self.builder.cond_br(cond_ir, thenbb, elsebb);
        self.builder.set_insert_block(Some(mergebb));

        let loaded = self.builder.load(&destlv);
        let destv = Value::new(loaded, e);
        {
            let mut d = destv.borrow_mut();
            let t = then_v.borrow();
            d.symbols = t.symbols.clone();
            d.fields = t.fields.clone();
        }
        Ok(destv)
    }

    /// The function that owns the current insertion block.
    pub(crate) fn current_function(&self, e: &Expr) -> Result<crate::ir::FuncId> {
        let block = self.builder.insert_block().ok_or_else(|| {
            Error::bug("No insertion point while lowering", &e.attr.span)
        })?;
        self.module().blocks[block].func.ok_or_else(|| {
            Error::bug("The insertion block belongs to no function", &e.attr.span)
        })
    }
}
