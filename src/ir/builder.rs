use crate::ir::instr::{
    BinTag, BlockId, CastTag, Cond, FuncId, Op, Val, ValKind,
};
use crate::ir::module::Module;
use crate::ir::ty::Type;

/// Appends instructions at a movable insertion point.
/// The builder owns the module it builds into; passes
/// that need to wander (function bodies, branch arms)
/// bookmark the insertion point with [`Builder::insert_block`]
/// and restore it symmetrically on exit.
#[derive(Debug)]
pub struct Builder {
    module: Module,
    insert: Option<BlockId>,
}

impl Builder {
    pub fn new(module: Module) -> Builder {
        Builder {
            module,
            insert: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    pub fn finish(self) -> Module {
        self.module
    }

    /// The current insertion point, for bookmarking.
    pub fn insert_block(&self) -> Option<BlockId> {
        self.insert
    }

    pub fn set_insert_block(&mut self, block: Option<BlockId>) {
        self.insert = block;
    }

    fn push(&mut self, op: Op, ty: Type) -> Val {
        let block = self
            .insert
            .expect("builder has no insertion point");
        let id = self.module.push_instr(block, op, ty);
        self.module.instr_val(id)
    }

    // -- constants --

    pub fn const_i1(&self, b: bool) -> Val {
        Val::const_int(Type::I1, b as i64)
    }

    pub fn const_i32(&self, n: i32) -> Val {
        Val::const_int(Type::I32, n as i64)
    }

    pub fn const_i64(&self, n: i64) -> Val {
        Val::const_int(Type::I64, n)
    }

    pub fn const_f64(&self, x: f64) -> Val {
        Val::const_float(x)
    }

    pub fn zero_of(&self, ty: &Type) -> Val {
        match ty {
            Type::Double => Val::const_float(0.0),
            Type::Ptr(_) => Val::const_null(ty.clone()),
            _ => Val::const_int(ty.clone(), 0),
        }
    }

    // -- arithmetic and logic --

    pub fn binary(&mut self, tag: BinTag, lhs: &Val, rhs: &Val) -> Val {
        let ty = lhs.ty.clone();
        self.push(
            Op::Binary {
                tag,
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            },
            ty,
        )
    }

    pub fn icmp(&mut self, cond: Cond, lhs: &Val, rhs: &Val) -> Val {
        self.push(
            Op::Icmp {
                cond,
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            },
            Type::I1,
        )
    }

    pub fn cast(&mut self, tag: CastTag, val: &Val, to: Type) -> Val {
        self.push(
            Op::Cast {
                tag,
                val: val.clone(),
            },
            to,
        )
    }

    // -- memory --

    pub fn alloca(&mut self, ty: &Type, name: Option<&str>) -> Val {
        self.push(
            Op::Alloca {
                ty: ty.clone(),
                name: name.map(|n| n.to_string()),
            },
            ty.clone().ptr(),
        )
    }

    pub fn load(&mut self, ptr: &Val) -> Val {
        let ty = ptr
            .ty
            .pointee()
            .expect("load requires a pointer operand")
            .clone();
        self.push(Op::Load { ptr: ptr.clone() }, ty)
    }

    pub fn store(&mut self, val: &Val, ptr: &Val) {
        self.push(
            Op::Store {
                val: val.clone(),
                ptr: ptr.clone(),
            },
            Type::Void,
        );
    }

    /// Computes the type a GEP over `base` with `indices`
    /// produces, without emitting anything. `None` when
    /// the indices don't fit the type.
    pub fn gep_result_type(base: &Type, indices: &[Val]) -> Option<Type> {
        let mut cur = base.pointee()?.clone();
        for index in &indices[1..] {
            cur = match cur {
                Type::Array(elem, _) => *elem,
                Type::Struct(fields) => {
                    let i = index.as_const_int()? as usize;
                    fields.get(i)?.clone()
                }
                _ => return None,
            };
        }
        Some(cur.ptr())
    }

    pub fn gep(&mut self, base: &Val, indices: Vec<Val>, inbounds: bool) -> Option<Val> {
        let ty = Builder::gep_result_type(&base.ty, &indices)?;
        Some(self.push(
            Op::Gep {
                base: base.clone(),
                indices,
                inbounds,
            },
            ty,
        ))
    }

    pub fn struct_gep(&mut self, ptr: &Val, index: u32) -> Val {
        let indices = vec![self.const_i32(0), self.const_i32(index as i32)];
        self.gep(ptr, indices, false)
            .expect("struct gep over a non-struct pointer")
    }

    // -- calls and control flow --

    pub fn call(&mut self, callee: &Val, args: Vec<Val>) -> Val {
        let ret = match callee.ty.pointee() {
            Some(Type::Func { ret, .. }) => (**ret).clone(),
            _ => panic!("call requires a function pointer"),
        };
        self.push(
            Op::Call {
                callee: callee.clone(),
                args,
            },
            ret,
        )
    }

    pub fn br(&mut self, dest: BlockId) {
        self.push(Op::Br { dest }, Type::Void);
    }

    pub fn cond_br(&mut self, cond: &Val, then_dest: BlockId, else_dest: BlockId) {
        self.push(
            Op::CondBr {
                cond: cond.clone(),
                then_dest,
                else_dest,
            },
            Type::Void,
        );
    }

    pub fn ret(&mut self, val: &Val) {
        let op = if val.ty.is_void() {
            Op::Ret { val: None }
        } else {
            Op::Ret {
                val: Some(val.clone()),
            }
        };
        self.push(op, Type::Void);
    }

    pub fn ret_void(&mut self) {
        self.push(Op::Ret { val: None }, Type::Void);
    }

    pub fn phi(&mut self, ty: Type, incoming: Vec<(Val, BlockId)>) -> Val {
        self.push(Op::Phi { incoming }, ty)
    }

    /// Interns a string constant and returns an `i8*` to
    /// its first byte.
    pub fn global_string_ptr(&mut self, data: &str) -> Val {
        let id = self.module.add_string_global(data);
        Val {
            kind: ValKind::Str(id),
            ty: Type::I8.ptr(),
        }
    }

    /// Declares (or finds) a function and returns its
    /// value.
    pub fn declared(&mut self, name: &str, ty: Type) -> Val {
        let id = self.module.get_or_insert_function(name, ty);
        self.module.func_val(id)
    }
}

/// Bookmarks an insertion point and the id of the block a
/// pass wants restored afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Bookmark(pub Option<BlockId>);

impl Builder {
    pub fn bookmark(&self) -> Bookmark {
        Bookmark(self.insert)
    }

    pub fn restore(&mut self, mark: Bookmark) {
        self.insert = mark.0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fixture() -> (Builder, FuncId) {
        let mut module = Module::new("test");
        let func = module.add_function(
            Some("f"),
            Type::Func {
                params: vec![Type::I32],
                ret: Box::new(Type::I32),
                vararg: false,
            },
        );
        let entry = module.create_named_block(func, "entry");
        let mut builder = Builder::new(module);
        builder.set_insert_block(Some(entry));
        (builder, func)
    }

    #[test]
    fn alloca_store_load_types() {
        let (mut builder, func) = fixture();

        let slot = builder.alloca(&Type::I32, Some("x"));
        assert_eq!(slot.ty, Type::I32.ptr());

        let arg = builder.module().arg_val(func, 0);
        builder.store(&arg, &slot);
        let back = builder.load(&slot);
        assert_eq!(back.ty, Type::I32);
    }

    #[test]
    fn gep_walks_aggregates() {
        let (mut builder, _) = fixture();

        let ary = Type::Array(Box::new(Type::I32), 3);
        let base = builder.alloca(&ary, None);
        let indices = vec![builder.const_i32(0), builder.const_i32(1)];
        let elem = builder.gep(&base, indices, true).unwrap();
        assert_eq!(elem.ty, Type::I32.ptr());

        let st = Type::Struct(vec![Type::I32, Type::Double]);
        let sbase = builder.alloca(&st, None);
        let field = builder.struct_gep(&sbase, 1);
        assert_eq!(field.ty, Type::Double.ptr());
    }

    #[test]
    fn ret_type_scan() {
        let (mut builder, func) = fixture();
        let forty_two = builder.const_i32(42);
        builder.ret(&forty_two);

        let rets = builder.module().ret_types(func);
        assert_eq!(rets, vec![Some(Type::I32)]);
    }
}
