use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::construct::tree::Expr;
use crate::ir;

/// Shared handle to a runtime [`Value`]. Values form a
/// graph: containers hold their members in `symbols`
/// (owning), members point back through `parent`
/// (non-owning), and copies share members' cells so a GEP
/// computed through one handle is visible through all.
pub type ValueRef = Rc<RefCell<Value>>;

/// The symbol/field snapshot captured at a `ret`. A call
/// result inherits it so that dot/at on the result
/// addresses the right struct indices.
#[derive(Debug, Clone, Default)]
pub struct RetTable {
    pub symbols: IndexMap<String, ValueRef>,
    pub fields: IndexMap<String, u32>,
}

/// A value the translator is juggling: either concrete IR
/// or a lazy node awaiting evaluation. Lazy values keep
/// the AST they came from so the evaluator can re-walk it
/// once argument types are known.
#[derive(Debug, Default)]
pub struct Value {
    pub ir: Option<ir::Val>,
    pub parent: Option<Weak<RefCell<Value>>>,
    pub ast: Option<Expr>,
    pub symbols: IndexMap<String, ValueRef>,
    pub fields: IndexMap<String, u32>,
    pub name: String,
    pub ret_table: Option<Rc<RetTable>>,
    pub is_lazy: bool,
    pub is_void: bool,
}

impl Value {
    pub fn new(ir: ir::Val, ast: &Expr) -> ValueRef {
        Rc::new(RefCell::new(Value {
            ir: Some(ir),
            ast: Some(ast.clone()),
            ..Value::default()
        }))
    }

    pub fn lazy(ir: ir::Val, ast: &Expr) -> ValueRef {
        Rc::new(RefCell::new(Value {
            ir: Some(ir),
            ast: Some(ast.clone()),
            is_lazy: true,
            ..Value::default()
        }))
    }

    /// A value with no IR yet: a fresh declaration, or a
    /// structure before its storage exists.
    pub fn pending(ast: &Expr) -> ValueRef {
        Rc::new(RefCell::new(Value {
            ast: Some(ast.clone()),
            ..Value::default()
        }))
    }

    pub fn void() -> ValueRef {
        Rc::new(RefCell::new(Value {
            is_void: true,
            ..Value::default()
        }))
    }

    /// A bare wrapper around an IR value, used for
    /// synthesized things like the entry function's
    /// arguments.
    pub fn wrap(ir: ir::Val) -> ValueRef {
        Rc::new(RefCell::new(Value {
            ir: Some(ir),
            ..Value::default()
        }))
    }

    pub fn ty(&self) -> Option<&ir::Type> {
        self.ir.as_ref().map(|v| &v.ty)
    }

    pub fn is_void(&self) -> bool {
        match self.ir {
            Some(ref v) => v.ty.is_void(),
            None => self.is_void,
        }
    }

    /// Fundamental values travel by load/store; aggregates
    /// (struct or array through any pointer depth) travel
    /// by memcpy of their backing storage.
    pub fn is_fundamental(&self) -> bool {
        match self.ty() {
            Some(ty) => ty.is_fundamental(),
            None => true,
        }
    }

    pub fn is_struct(&self) -> bool {
        fn through_ptrs(ty: &ir::Type) -> bool {
            match ty {
                ir::Type::Ptr(inner) => through_ptrs(inner),
                ty => ty.is_struct(),
            }
        }
        self.ty().map(through_ptrs).unwrap_or(false)
    }

    pub fn parent(&self) -> Option<ValueRef> {
        self.parent.as_ref().and_then(|w| w.upgrade())
    }

    /// A copy with a replaced IR value. Member cells are
    /// copied recursively so the copy's accessor map is
    /// private, but members keep their original parent
    /// edges; ownership stays with the enclosing scope.
    pub fn copy_with_ir(&self, ir: Option<ir::Val>) -> ValueRef {
        let symbols = self
            .symbols
            .iter()
            .map(|(k, v)| (k.clone(), v.borrow().copy()))
            .collect();
        Rc::new(RefCell::new(Value {
            ir,
            parent: self.parent.clone(),
            ast: self.ast.clone(),
            symbols,
            fields: self.fields.clone(),
            name: self.name.clone(),
            ret_table: self.ret_table.clone(),
            is_lazy: self.is_lazy,
            is_void: self.is_void,
        }))
    }

    pub fn copy(&self) -> ValueRef {
        self.copy_with_ir(self.ir.clone())
    }

    pub fn make_ret_table(&self) -> Rc<RetTable> {
        Rc::new(RetTable {
            symbols: self.symbols.clone(),
            fields: self.fields.clone(),
        })
    }

    pub fn apply_ret_table(&mut self, table: &Rc<RetTable>) {
        self.symbols = table.symbols.clone();
        self.fields = table.fields.clone();
    }
}

/// Links `child` into `parent`'s member graph.
pub fn set_parent(child: &ValueRef, parent: &ValueRef) {
    child.borrow_mut().parent = Some(Rc::downgrade(parent));
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{Type, Val};

    #[test]
    fn copy_does_not_share_member_state() {
        let original = Value::wrap(Val::const_int(Type::I32, 1));
        original.borrow_mut().symbols.insert(
            "x".to_string(),
            Value::wrap(Val::const_int(Type::I32, 2)),
        );

        let copied = original.borrow().copy();
        copied.borrow().symbols["x"].borrow_mut().name = "renamed".to_string();

        assert_eq!(original.borrow().symbols["x"].borrow().name, "");
    }

    #[test]
    fn parent_edges_are_non_owning() {
        let child = Value::wrap(Val::const_int(Type::I32, 1));
        {
            let parent = Value::void();
            set_parent(&child, &parent);
            assert!(child.borrow().parent().is_some());
        }
        // parent dropped; the edge goes stale instead of
        // keeping the parent alive
        assert!(child.borrow().parent().is_none());
    }

    #[test]
    fn ret_table_round_trip() {
        let v = Value::wrap(Val::const_int(Type::I32, 1));
        v.borrow_mut().fields.insert("a".to_string(), 0);
        let table = v.borrow().make_ret_table();

        let dest = Value::void();
        dest.borrow_mut().apply_ret_table(&table);
        assert_eq!(dest.borrow().fields["a"], 0);
    }
}
